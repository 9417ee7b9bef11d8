//! Adapter for `(request, response, next)` style middleware.

use std::sync::Arc;

use crate::context::Context;
use crate::dispatch::{keys, Interceptor, Proceed};
use crate::error::HttpError;
use crate::http::{RequestInfo, ResponseWriter};

/// Interceptor built from a middleware function that only needs the request,
/// the response and the continuation.
pub struct Connect<F> {
    middleware: F,
}

/// Wrap `middleware` as an interceptor.
pub fn connect<F>(middleware: F) -> Connect<F>
where
    F: Fn(&RequestInfo, &ResponseWriter, Proceed) -> Result<(), HttpError> + Send + Sync + 'static,
{
    Connect { middleware }
}

impl<F> Interceptor for Connect<F>
where
    F: Fn(&RequestInfo, &ResponseWriter, Proceed) -> Result<(), HttpError> + Send + Sync + 'static,
{
    fn execute(&self, ctx: &Context, proceed: Proceed) -> Result<(), HttpError> {
        let request: Arc<RequestInfo> = ctx.get_as(keys::REQUEST)?;
        let response: Arc<ResponseWriter> = ctx.get_as(keys::RESPONSE)?;
        (self.middleware)(&request, &response, proceed)
    }
}

impl<F> std::fmt::Debug for Connect<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connect").finish_non_exhaustive()
    }
}
