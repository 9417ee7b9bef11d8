//! Stock interceptors.

pub mod check_method;
pub mod connect;

pub use check_method::CheckHttpMethod;
pub use connect::{connect, Connect};
