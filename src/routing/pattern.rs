//! Route pattern parsing.
//!
//! Pattern syntax, one rule per `/`-separated segment:
//! - `:name` captures the segment under `name`
//! - `@name:regex` captures the segment under `name` if `regex` matches all of it
//! - `*` captures the remaining segments, only valid as the last segment
//! - anything else must match literally

use regex::Regex;

use crate::error::{Error, Result};

/// Strip one leading and one trailing `/` and split on `/`.
///
/// `"/"` and `""` both yield a single empty segment.
pub fn split_path(path: &str) -> Vec<&str> {
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    path.split('/').collect()
}

/// A parsed pattern segment.
#[derive(Debug, Clone)]
pub enum Segment {
    Literal(String),
    Param(String),
    Regex { name: String, regex: Regex },
    Wildcard,
}

impl Segment {
    /// Parse every segment of `pattern`.
    pub fn parse_pattern(pattern: &str) -> Result<Vec<Segment>> {
        let parts = split_path(pattern);
        let last = parts.len() - 1;
        parts
            .iter()
            .enumerate()
            .map(|(i, part)| {
                if *part == "*" && i != last {
                    return Err(invalid(pattern, "* must only be at the end."));
                }
                Segment::parse(pattern, part)
            })
            .collect()
    }

    fn parse(pattern: &str, part: &str) -> Result<Segment> {
        if part == "*" {
            return Ok(Segment::Wildcard);
        }
        if let Some(name) = part.strip_prefix(':') {
            if name.is_empty() {
                return Err(invalid(pattern, "parameter name is empty."));
            }
            return Ok(Segment::Param(name.to_string()));
        }
        if let Some(spec) = part.strip_prefix('@') {
            let Some((name, expr)) = spec.split_once(':') else {
                return Err(invalid(pattern, format!("expected @name:regex, got [{}].", part)));
            };
            if name.is_empty() {
                return Err(invalid(pattern, "regex segment name is empty."));
            }
            let regex = Regex::new(&format!("^(?:{})$", expr))
                .map_err(|e| invalid(pattern, format!("bad regex for [{}]: {}", name, e)))?;
            return Ok(Segment::Regex {
                name: name.to_string(),
                regex,
            });
        }
        Ok(Segment::Literal(part.to_string()))
    }
}

fn invalid(pattern: &str, reason: impl Into<String>) -> Error {
    Error::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}
