//! Error types shared by the framework core.
//!
//! # Design Decisions
//! - [`Error`] covers wiring mistakes (providers, scopes, route registration).
//!   These are fail-fast and mostly surface at start-up.
//! - [`HttpError`] is the request-time error. It carries the status, any
//!   extra response headers and an optional source for the error page.
//! - Every [`Error`] raised while serving a request renders as a 500.

use std::fmt;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::context::Scope;

/// Boxed error used for factory failures and error sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Configuration and wiring errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A provider is already bound to the id.
    #[error("Provider already registered for [{0}]")]
    DuplicateProvider(String),

    /// Nothing is bound to the id.
    #[error("No provider for [{0}]")]
    NoProvider(String),

    /// A scoped provider was resolved without a context of that scope in the chain.
    #[error("Out of scope? Tried to access [{id}] for scope [{scope}]")]
    OutOfScope { id: String, scope: Scope },

    /// Seeding was attempted on the root context.
    #[error("Seeding [{0}] not supported on root context, use register_instance to force a singleton")]
    SeedOnRoot(String),

    /// Provider registration was attempted on a child context.
    #[error("Can not register [{0}], providers may only be registered on the root context")]
    NotRoot(String),

    /// Provider registration was attempted after start-up.
    #[error("Can not register [{0}], the registry is sealed")]
    RegistrySealed(String),

    /// The resolved instance is not of the requested type.
    #[error("Type mismatch for [{id}], expected {expected}")]
    TypeMismatch { id: String, expected: &'static str },

    /// A route pattern is malformed.
    #[error("Invalid path [{pattern}], {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A route pattern collides with one registered earlier.
    #[error("Can not register [{pattern}], path is ambiguous. [{previous}] previously registered.")]
    AmbiguousPath { pattern: String, previous: String },

    /// `done` was called on a deferred value that already has a result.
    #[error("Deferred value already has a result")]
    AlreadyResolved,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias for wiring operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error raised while handling a request.
///
/// Rendered by the dispatcher guard: the status selects the log verbosity and
/// the page layout, `headers` are attached to the error response.
#[derive(Debug, Clone)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    headers: HeaderMap,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            headers: HeaderMap::new(),
            source: None,
        }
    }

    /// No route matched the request.
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "404 Not Found")
    }

    /// 401 carrying challenge headers (e.g. `WWW-Authenticate`).
    pub fn not_authorized(headers: HeaderMap) -> Self {
        Self {
            headers,
            ..Self::new(StatusCode::UNAUTHORIZED, "401 Not Authorized")
        }
    }

    /// Any status with a caller-chosen message.
    pub fn custom(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, message)
    }

    /// A 500 wrapping an unexpected failure.
    pub fn internal(source: impl Into<BoxError>) -> Self {
        let source: BoxError = source.into();
        Self {
            message: source.to_string(),
            source: Some(Arc::from(source)),
            ..Self::new(StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }

    /// Attach a header to the error response.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(Arc::from(source.into()));
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// The message followed by every cause in the source chain.
    pub fn detail(&self) -> String {
        let mut detail = self.message.clone();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            let text = err.to_string();
            if text != detail {
                detail.push_str("\n  caused by: ");
                detail.push_str(&text);
            }
            cause = err.source();
        }
        detail
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status.as_u16())
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

impl From<Error> for HttpError {
    fn from(err: Error) -> Self {
        HttpError::internal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wiring_errors_render_as_500() {
        let err: HttpError = Error::NoProvider("db".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "No provider for [db]");
        assert!(err.is_server_error());
    }

    #[test]
    fn not_authorized_keeps_challenge_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("www-authenticate", HeaderValue::from_static("Basic realm=\"mne\""));
        let err = HttpError::not_authorized(headers);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.headers()["www-authenticate"], "Basic realm=\"mne\"");
    }

    #[test]
    fn detail_walks_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = HttpError::bad_request("upload failed").with_source(io);
        assert_eq!(err.detail(), "upload failed\n  caused by: disk on fire");
    }
}
