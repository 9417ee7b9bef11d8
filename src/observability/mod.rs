//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → a `request` span per request carrying the request ID
//!
//! Consumers:
//!     → logging.rs (fmt subscriber to stdout, filtered by EnvFilter)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every event of a request via its span
//! - `RUST_LOG` wins over the configured level

pub mod logging;
