//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup):
//!     add_action(pattern, action)
//!     → pattern.rs (split + parse segments, compile regexes)
//!     → trie.rs (insert, detect ambiguity)
//!
//! Incoming Request (decoded path)
//!     → trie.rs (walk: literal > regex > param > wildcard)
//!     → Return: RouteMatch { action, pattern, matches } or None
//! ```
//!
//! # Design Decisions
//! - Patterns are validated and regexes compiled at registration, never per request
//! - Most specific match wins; a wildcard is only a fallback
//! - One parameter name per trie position, so lookups can't be ambiguous
//! - Regex segments are anchored to the whole segment

pub mod pattern;
pub mod trie;

pub use pattern::{split_path, Segment};
pub use trie::{Matches, PathMatcher, RouteMatch};
