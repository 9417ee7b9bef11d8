//! Segment trie mapping path patterns to actions.

use std::collections::HashMap;

use regex::Regex;
use serde::Serialize;

use super::pattern::{split_path, Segment};
use crate::error::{Error, Result};

/// Values extracted from a matched path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Matches {
    params: Vec<(String, String)>,
    wildcard: Option<Vec<String>>,
}

impl Matches {
    /// Value captured for a `:name` or `@name:regex` segment.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Segments captured by a trailing `*`.
    pub fn wildcard(&self) -> Option<&[String]> {
        self.wildcard.as_deref()
    }

    /// Named captures in pattern order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.params.len() + usize::from(self.wildcard.is_some())
    }

    /// Rewrite every captured value with `f`, e.g. to percent-decode them.
    pub fn try_map<E>(self, mut f: impl FnMut(&str) -> Result<String, E>) -> Result<Self, E> {
        let params = self
            .params
            .into_iter()
            .map(|(name, value)| Ok((name, f(&value)?)))
            .collect::<Result<Vec<_>, E>>()?;
        let wildcard = self
            .wildcard
            .map(|segments| segments.iter().map(|s| f(s)).collect::<Result<Vec<_>, E>>())
            .transpose()?;
        Ok(Self { params, wildcard })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'a, A> {
    pub action: &'a A,
    /// The pattern the action was registered under.
    pub pattern: &'a str,
    pub matches: Matches,
}

struct Leaf<A> {
    names: Vec<String>,
    full_path: String,
    action: A,
}

struct ParamSlot<A> {
    name: String,
    /// Pattern that introduced this slot, for error messages.
    pattern: String,
    node: Box<Node<A>>,
}

struct RegexSlot<A> {
    name: String,
    regex: Regex,
    node: Node<A>,
}

struct Node<A> {
    literals: HashMap<String, Node<A>>,
    regexes: Vec<RegexSlot<A>>,
    param: Option<ParamSlot<A>>,
    wildcard: Option<Box<Node<A>>>,
    leaf: Option<Leaf<A>>,
}

impl<A> Default for Node<A> {
    fn default() -> Self {
        Self {
            literals: HashMap::new(),
            regexes: Vec::new(),
            param: None,
            wildcard: None,
            leaf: None,
        }
    }
}

/// Router over `/`-separated path patterns.
///
/// Built once at start-up and read-only afterwards.
pub struct PathMatcher<A> {
    root: Node<A>,
    routes: usize,
}

impl<A> Default for PathMatcher<A> {
    fn default() -> Self {
        Self {
            root: Node::default(),
            routes: 0,
        }
    }
}

impl<A> PathMatcher<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `action` under `pattern`.
    ///
    /// Fails on malformed patterns, on a second parameter name at an occupied
    /// position and on a pattern that resolves to an already bound leaf.
    pub fn add_action(&mut self, pattern: &str, action: A) -> Result<()> {
        let segments = Segment::parse_pattern(pattern)?;
        let mut names = Vec::new();
        let mut node = &mut self.root;

        for segment in segments {
            node = match segment {
                Segment::Literal(literal) => node.literals.entry(literal).or_default(),
                Segment::Param(name) => {
                    let slot = node.param.get_or_insert_with(|| ParamSlot {
                        name: name.clone(),
                        pattern: pattern.to_string(),
                        node: Box::default(),
                    });
                    if slot.name != name {
                        return Err(Error::AmbiguousPath {
                            pattern: pattern.to_string(),
                            previous: slot.pattern.clone(),
                        });
                    }
                    names.push(name);
                    &mut *slot.node
                }
                Segment::Regex { name, regex } => {
                    // A repeated name reuses the slot compiled first.
                    let index = match node.regexes.iter().position(|slot| slot.name == name) {
                        Some(index) => index,
                        None => {
                            node.regexes.push(RegexSlot {
                                name: name.clone(),
                                regex,
                                node: Node::default(),
                            });
                            node.regexes.len() - 1
                        }
                    };
                    names.push(name);
                    &mut node.regexes[index].node
                }
                Segment::Wildcard => &mut **node.wildcard.get_or_insert_with(Box::default),
            };
        }

        if let Some(previous) = &node.leaf {
            return Err(Error::AmbiguousPath {
                pattern: pattern.to_string(),
                previous: previous.full_path.clone(),
            });
        }

        tracing::debug!(pattern = %pattern, params = ?names, "Route registered");
        node.leaf = Some(Leaf {
            names,
            full_path: pattern.to_string(),
            action,
        });
        self.routes += 1;
        Ok(())
    }

    /// Find the most specific action for `path`.
    pub fn get_match(&self, path: &str) -> Option<RouteMatch<'_, A>> {
        let parts = split_path(path);
        let mut node = &self.root;
        let mut values: Vec<&str> = Vec::new();

        // Most recent wildcard seen and the segments consumed since.
        let mut pending: Option<&Node<A>> = None;
        let mut captured: Vec<&str> = Vec::new();
        let mut used_wildcard = false;

        for (i, part) in parts.iter().copied().enumerate() {
            if let Some(wildcard) = node.wildcard.as_deref() {
                pending = Some(wildcard);
                captured.clear();
            }

            let next = if let Some(child) = node.literals.get(part) {
                Some(child)
            } else if let Some(slot) = node.regexes.iter().find(|slot| slot.regex.is_match(part)) {
                values.push(part);
                Some(&slot.node)
            } else if let Some(slot) = &node.param {
                values.push(part);
                Some(&*slot.node)
            } else {
                None
            };

            match next {
                Some(child) => {
                    node = child;
                    if pending.is_some() {
                        captured.push(part);
                    }
                }
                None => {
                    node = pending?;
                    captured.extend_from_slice(&parts[i..]);
                    used_wildcard = true;
                    break;
                }
            }
        }

        if !used_wildcard && node.leaf.is_none() && !captured.is_empty() {
            if let Some(wildcard) = pending {
                node = wildcard;
                used_wildcard = true;
            }
        }

        let leaf = node.leaf.as_ref()?;
        let params = leaf
            .names
            .iter()
            .zip(values)
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect();
        let wildcard = used_wildcard.then(|| captured.iter().map(|s| s.to_string()).collect());

        Some(RouteMatch {
            action: &leaf.action,
            pattern: &leaf.full_path,
            matches: Matches { params, wildcard },
        })
    }

    /// Number of registered patterns.
    pub fn len(&self) -> usize {
        self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes == 0
    }
}

impl<A> std::fmt::Debug for PathMatcher<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathMatcher")
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}
