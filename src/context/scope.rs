//! Service scopes.

use serde::{Deserialize, Serialize};

/// Lifetime policy for a service instance.
///
/// - **Default**: a new instance for every `get`.
/// - **Request**: one instance per request context.
/// - **Singleton**: one instance per process, owned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Default,
    Request,
    Singleton,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Request => write!(f, "request"),
            Self::Singleton => write!(f, "singleton"),
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "request" => Ok(Self::Request),
            "singleton" => Ok(Self::Singleton),
            other => Err(format!("Unknown scope: {}", other)),
        }
    }
}
