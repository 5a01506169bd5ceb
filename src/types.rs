use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// What the scheduler does once a node has failed.
///
/// - `FailFast`: nothing new is dispatched after the first failure is
///   observed. Dependents of the failed node and every node that has not
///   started yet end up `Skipped`; nodes already running finish normally.
/// - `Continue`: dependents of the failed node still end up `Skipped`, but
///   every branch that does not depend on it keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    FailFast,
    Continue,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::FailFast
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "fail-fast" => Ok(FailurePolicy::FailFast),
            "continue" => Ok(FailurePolicy::Continue),
            other => Err(format!(
                "invalid failure_policy: {other} (expected \"fail-fast\" or \"continue\")"
            )),
        }
    }
}

/// Access mode requested on a named resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccessMode {
    /// Sole holder; excludes every other holder of the key.
    Exclusive,
    /// Any number of shared holders, but never alongside an exclusive one.
    Shared,
}

impl AccessMode {
    /// Whether a new request in `requested` mode may join the current holders.
    pub fn compatible_with(self, requested: AccessMode) -> bool {
        matches!((self, requested), (AccessMode::Shared, AccessMode::Shared))
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Exclusive => f.write_str("exclusive"),
            AccessMode::Shared => f.write_str("shared"),
        }
    }
}
