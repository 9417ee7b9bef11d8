//! Ids of the values every request context carries.

/// [`RequestInfo`](crate::http::RequestInfo), seeded.
pub const REQUEST: &str = "request";

/// [`ResponseWriter`](crate::http::ResponseWriter), seeded.
pub const RESPONSE: &str = "response";

/// [`BoundAction`](super::BoundAction) of the matched route, seeded.
pub const ACTION: &str = "action";

/// [`Matches`](crate::routing::Matches) of the matched route, seeded.
pub const MATCHES: &str = "matches";

/// Percent-decoded request path as a `String`, seeded.
pub const PATH: &str = "path";

/// Interceptor chain of the request, seeded when the chain starts.
pub(crate) const CHAIN: &str = "chain";

/// Request ID as a `String`, seeded.
pub const REQUEST_ID: &str = "request-id";

/// [`QueryParams`](crate::http::QueryParams), request-scoped provider.
pub const QUERY: &str = "query";

/// [`PostData`](crate::http::PostData), request-scoped provider.
pub const POST_DATA: &str = "post-data";

/// [`AppConfig`](crate::config::AppConfig), singleton registered by the app.
pub const CONFIG: &str = "config";
