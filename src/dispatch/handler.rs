//! Action and interceptor traits.
//!
//! Closures implement both traits directly. Because Rust can't infer a
//! closure's argument types from a blanket impl, [`action_fn`] and
//! [`interceptor_fn`] pin the signature for inline closures.

use std::sync::Arc;

use axum::http::{Method, StatusCode};

use super::chain::Proceed;
use super::keys;
use crate::context::Context;
use crate::error::HttpError;
use crate::http::ResponseWriter;

/// Handles a matched request. Expected to end the response, now or later.
pub trait Action: Send + Sync + 'static {
    fn execute(&self, ctx: &Context) -> Result<(), HttpError>;
}

/// Wraps the rest of the chain.
///
/// Call [`Proceed::proceed`] (or [`Proceed::proceed_then`]) to continue, or
/// end the response and return to stop the chain.
pub trait Interceptor: Send + Sync + 'static {
    fn execute(&self, ctx: &Context, proceed: Proceed) -> Result<(), HttpError>;
}

impl<F> Action for F
where
    F: Fn(&Context) -> Result<(), HttpError> + Send + Sync + 'static,
{
    fn execute(&self, ctx: &Context) -> Result<(), HttpError> {
        self(ctx)
    }
}

impl<F> Interceptor for F
where
    F: Fn(&Context, Proceed) -> Result<(), HttpError> + Send + Sync + 'static,
{
    fn execute(&self, ctx: &Context, proceed: Proceed) -> Result<(), HttpError> {
        self(ctx, proceed)
    }
}

/// Pin the signature of an action closure.
pub fn action_fn<F>(f: F) -> F
where
    F: Fn(&Context) -> Result<(), HttpError> + Send + Sync + 'static,
{
    f
}

/// Pin the signature of an interceptor closure.
pub fn interceptor_fn<F>(f: F) -> F
where
    F: Fn(&Context, Proceed) -> Result<(), HttpError> + Send + Sync + 'static,
{
    f
}

/// An action together with its route annotations, seeded as `action`.
#[derive(Clone)]
pub struct BoundAction {
    pattern: Arc<str>,
    methods: Option<Arc<[Method]>>,
    handler: Arc<dyn Action>,
}

impl BoundAction {
    pub fn new(pattern: &str, methods: Option<Vec<Method>>, handler: Arc<dyn Action>) -> Self {
        Self {
            pattern: Arc::from(pattern),
            methods: methods.map(Arc::from),
            handler,
        }
    }

    /// The pattern the action was registered under.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Methods the action accepts, `None` for any.
    pub fn methods(&self) -> Option<&[Method]> {
        self.methods.as_deref()
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.methods
            .as_deref()
            .map_or(true, |methods| methods.contains(method))
    }

    pub fn execute(&self, ctx: &Context) -> Result<(), HttpError> {
        self.handler.execute(ctx)
    }
}

impl std::fmt::Debug for BoundAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundAction")
            .field("pattern", &self.pattern)
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

/// Responds with a fixed status and HTML content.
#[derive(Debug, Clone)]
pub struct SimpleAction {
    status: StatusCode,
    content: String,
}

impl SimpleAction {
    pub fn new(status: StatusCode, content: impl Into<String>) -> Self {
        Self {
            status,
            content: content.into(),
        }
    }
}

impl Action for SimpleAction {
    fn execute(&self, ctx: &Context) -> Result<(), HttpError> {
        let response = ctx.get_as::<ResponseWriter>(keys::RESPONSE)?;
        response.html(self.status, self.content.as_bytes());
        Ok(())
    }
}
