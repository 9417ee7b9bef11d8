//! Rejects requests whose method the matched action wasn't registered for.

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};

use crate::context::Context;
use crate::dispatch::{keys, BoundAction, Interceptor, Proceed};
use crate::error::HttpError;
use crate::http::{RequestInfo, ResponseWriter};

/// Answers 405 with an `Allow` header when the action was registered through
/// [`Dispatcher::add_action_for`](crate::dispatch::Dispatcher::add_action_for)
/// and the request method isn't in its list.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckHttpMethod;

impl Interceptor for CheckHttpMethod {
    fn execute(&self, ctx: &Context, proceed: Proceed) -> Result<(), HttpError> {
        let request = ctx.get_as::<RequestInfo>(keys::REQUEST)?;
        let action = ctx.get_as::<BoundAction>(keys::ACTION)?;

        let Some(methods) = action.methods() else {
            return proceed.proceed();
        };
        if action.allows(request.method()) {
            return proceed.proceed();
        }

        let allowed = methods
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(",");
        tracing::debug!(method = %request.method(), allowed = %allowed, "Method not allowed");

        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&allowed) {
            headers.insert(header::ALLOW, value);
        }
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));

        let response = ctx.get_as::<ResponseWriter>(keys::RESPONSE)?;
        response.write_head(StatusCode::METHOD_NOT_ALLOWED, headers);
        response.end_with(format!(
            "Invalid method: {}; allowed: {}",
            request.method(),
            allowed
        ));
        Ok(())
    }
}
