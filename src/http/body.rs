//! Request body decoding.
//!
//! The body is read on a background task and delivered through a
//! [`PostData`] deferred, so handlers can register interest before the bytes
//! have arrived.

use axum::body::Body;
use axum::http::StatusCode;
use serde_json::{Map, Value};
use tokio::runtime::Handle;

use super::request::RequestInfo;
use crate::deferred::Deferred;
use crate::error::HttpError;

/// The decoded request body: a JSON value for JSON bodies, an object of
/// strings (arrays for repeated keys) for form bodies.
pub type PostData = Deferred<Value>;

/// Start reading the body of `request` into a new [`PostData`].
///
/// Bodies larger than `limit` bytes are rejected with 413.
pub fn read_post_data(request: &RequestInfo, limit: usize) -> PostData {
    let post_data = PostData::new();
    let content_type = request.content_type();

    let Some(body) = request.take_body() else {
        let _ = post_data.reject(HttpError::internal("request body already consumed"));
        return post_data;
    };
    let Ok(handle) = Handle::try_current() else {
        let _ = post_data.reject(HttpError::internal("request body read outside the runtime"));
        return post_data;
    };

    let deferred = post_data.clone();
    handle.spawn(async move {
        let result = read_body(body, limit)
            .await
            .and_then(|bytes| parse_body(&content_type, &bytes));
        if let Err(e) = &result {
            tracing::debug!(content_type = %content_type, error = %e, "Request body rejected");
        }
        let _ = deferred.done(result);
    });
    post_data
}

async fn read_body(body: Body, limit: usize) -> Result<axum::body::Bytes, HttpError> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        HttpError::new(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large or unreadable")
            .with_source(e)
    })
}

/// Decode `bytes` according to `content_type` (a bare, lowercased media type).
pub fn parse_body(content_type: &str, bytes: &[u8]) -> Result<Value, HttpError> {
    match content_type {
        "" | "application/x-www-form-urlencoded" => Ok(parse_form(bytes)),
        "application/json" => serde_json::from_slice(bytes).map_err(|e| {
            HttpError::bad_request(format!(
                "Invalid JSON data: {:?}",
                String::from_utf8_lossy(bytes)
            ))
            .with_source(e)
        }),
        other => Err(HttpError::bad_request(format!(
            "Unsupported content type: {}",
            other
        ))),
    }
}

fn parse_form(bytes: &[u8]) -> Value {
    let mut fields = Map::new();
    for (key, value) in url::form_urlencoded::parse(bytes).into_owned() {
        match fields.get_mut(&key) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                fields.insert(key, Value::String(value));
            }
        }
    }
    Value::Object(fields)
}
