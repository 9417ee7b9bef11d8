//! Error guard around everything the dispatcher runs for a request.
//!
//! Errors and panics raised by interceptors, actions and their callbacks are
//! caught here and rendered as an HTML error page on the request's response.
//! Rendering aborts the interceptor chain, so after callbacks never see a
//! failed request.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use axum::http::{header, HeaderValue, StatusCode};

use super::chain::ChainHandle;
use super::keys;
use crate::context::Context;
use crate::error::HttpError;
use crate::http::{RequestInfo, ResponseWriter};

/// A panic caught while handling a request.
#[derive(Debug, thiserror::Error)]
#[error("panicked: {0}")]
pub struct PanicError(String);

/// Run `f` and render any error or panic it raises.
pub fn exec<F>(ctx: &Context, f: F)
where
    F: FnOnce() -> Result<(), HttpError>,
{
    let err = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => return,
        Ok(Err(err)) => err,
        Err(payload) => HttpError::internal(PanicError(panic_message(payload.as_ref()))),
    };
    render(ctx, err);
}

/// Guard a callback that runs later, e.g. on a deferred value.
pub fn wrap<T, F>(ctx: &Context, f: F) -> impl FnOnce(T) + Send + 'static
where
    F: FnOnce(T) -> Result<(), HttpError> + Send + 'static,
    T: 'static,
{
    let ctx = ctx.clone();
    move |value| exec(&ctx, || f(value))
}

/// Abort the request's chain, log `err` and write it to the request's
/// response, unless already ended.
pub fn render(ctx: &Context, err: HttpError) {
    if let Ok(Some(chain)) = ctx.get_optional_as::<ChainHandle>(keys::CHAIN) {
        chain.abort();
    }

    let request = ctx
        .get_optional_as::<RequestInfo>(keys::REQUEST)
        .ok()
        .flatten();
    let method = request.as_ref().map(|r| r.method().as_str()).unwrap_or("-");
    let uri = request
        .as_ref()
        .map(|r| r.uri().to_string())
        .unwrap_or_default();
    let status = err.status();

    if status == StatusCode::NOT_FOUND {
        tracing::debug!(method, uri = %uri, "{}", err.message());
    } else if err.is_server_error() {
        tracing::error!(method, uri = %uri, status = status.as_u16(), detail = %err.detail(), "Request failed");
    } else {
        tracing::info!(method, uri = %uri, status = status.as_u16(), "{}", err.message());
    }

    let response = match ctx.get_optional_as::<ResponseWriter>(keys::RESPONSE) {
        Ok(Some(response)) => response,
        _ => {
            tracing::error!(uri = %uri, "No response to render the error on");
            return;
        }
    };
    if response.is_ended() {
        tracing::warn!(uri = %uri, status = status.as_u16(), "Error raised after the response ended");
        return;
    }

    let body = if err.is_server_error() {
        format!(
            "<h1>Server Error {}</h1><pre>{}</pre>",
            status.as_u16(),
            escape_html(&err.detail())
        )
    } else {
        format!("<h1>{}</h1>", escape_html(err.message()))
    };

    let mut headers = err.headers().clone();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response.write_head(status, headers);
    response.end_with(body);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
