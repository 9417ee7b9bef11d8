//! Request snapshot seeded into the request context.
//!
//! # Responsibilities
//! - Keep method, URI, headers and peer address readable by every handler
//! - Hand the body out once, to whoever reads it first (usually `post-data`)
//! - Decode the query string for the `query` provider
//!
//! # Design Decisions
//! - Headers are immutable after the request enters the dispatcher
//! - The body sits behind a mutex so the snapshot stays `Sync`

use std::net::SocketAddr;
use std::sync::Mutex;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, Uri, Version};

/// Header carrying the request ID set by the server layers.
pub const X_REQUEST_ID: &str = "x-request-id";

/// An inbound request as seen by interceptors and actions.
pub struct RequestInfo {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    body: Mutex<Option<Body>>,
}

impl RequestInfo {
    pub fn from_request(request: Request<Body>, remote_addr: Option<SocketAddr>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            remote_addr,
            body: Mutex::new(Some(body)),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Raw (still percent-encoded) path.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Header value as text, `None` if absent or not visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Media type of the body without parameters, lowercased. Empty if unset.
    pub fn content_type(&self) -> String {
        self.header(header::CONTENT_TYPE.as_str())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.header(X_REQUEST_ID)
    }

    /// Take the body. Later calls return `None`.
    pub fn take_body(&self) -> Option<Body> {
        self.body
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }
}

impl std::fmt::Debug for RequestInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestInfo")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("version", &self.version)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

/// Decoded query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn parse(query: &str) -> Self {
        Self {
            pairs: url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        }
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_exposes_request_parts() {
        let request = Request::builder()
            .method("POST")
            .uri("/a%20b/?x=1")
            .header("Content-Type", "Application/JSON; charset=utf-8")
            .header(X_REQUEST_ID, "abc")
            .body(Body::from("{}"))
            .unwrap();
        let info = RequestInfo::from_request(request, Some("127.0.0.1:9".parse().unwrap()));

        assert_eq!(*info.method(), Method::POST);
        assert_eq!(info.path(), "/a%20b/");
        assert_eq!(info.query(), Some("x=1"));
        assert_eq!(info.content_type(), "application/json");
        assert_eq!(info.request_id(), Some("abc"));
        assert!(info.take_body().is_some());
        assert!(info.take_body().is_none());
    }

    #[test]
    fn query_params_decode_and_repeat() {
        let query = QueryParams::parse("q=hello+world&tag=a&tag=b&empty=");
        assert_eq!(query.get("q"), Some("hello world"));
        assert_eq!(query.get_all("tag").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(query.get("empty"), Some(""));
        assert_eq!(query.get("missing"), None);
        assert_eq!(query.len(), 4);
    }
}
