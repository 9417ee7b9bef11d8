//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, timeout, tracing layers)
//!     → request.rs (RequestInfo snapshot, query decoding)
//!     → [dispatcher runs the interceptor chain]
//!     → response.rs (ResponseWriter, header and completion hooks)
//!     → Send to client
//!
//! Request body (on demand):
//!     post-data provider → body.rs (background read) → PostData deferred
//! ```

pub mod body;
pub mod request;
pub mod response;
pub mod server;

pub use body::{parse_body, read_post_data, PostData};
pub use request::{QueryParams, RequestInfo, X_REQUEST_ID};
pub use response::{ResponseSnapshot, ResponseWriter};
pub use server::HttpServer;
