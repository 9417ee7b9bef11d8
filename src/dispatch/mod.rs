//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! DispatchService::handle(request)
//!     → child Context (Request scope)
//!     → seed request, response, request-id, path
//!     → PathMatcher::get_match(path)        no match → 404
//!     → seed action, matches
//!     → chain.rs: interceptors[0..n] → ExecuteAction → action
//!     → response.end() → completion hook → after callbacks (LIFO)
//!     → Response delivered to the server task
//! ```
//!
//! # Design Decisions
//! - `Dispatcher` is a builder; `start` consumes it, so routes and
//!   interceptors can't change while serving
//! - Every step runs under guard.rs: errors and panics become error pages
//! - The request context is released when the request is over

pub mod chain;
pub mod dispatcher;
pub mod guard;
pub mod handler;
pub mod keys;

pub use chain::Proceed;
pub use dispatcher::{DispatchService, Dispatcher};
pub use guard::PanicError;
pub use handler::{action_fn, interceptor_fn, Action, BoundAction, Interceptor, SimpleAction};
