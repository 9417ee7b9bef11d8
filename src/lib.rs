//! mne: a small HTTP application framework.
//!
//! Requests flow through a scoped service [`Context`], a trie
//! [`PathMatcher`] and an interceptor chain run by the [`Dispatcher`].

pub mod app;
pub mod config;
pub mod context;
pub mod deferred;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod interceptors;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use app::{ActionModule, App, Module};
pub use config::AppConfig;
pub use context::{Context, Scope};
pub use deferred::Deferred;
pub use dispatch::{
    action_fn, interceptor_fn, Action, DispatchService, Dispatcher, Interceptor, Proceed,
    SimpleAction,
};
pub use error::{Error, HttpError, Result};
pub use http::{HttpServer, RequestInfo, ResponseWriter};
pub use lifecycle::Shutdown;
pub use routing::{Matches, PathMatcher};
