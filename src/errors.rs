// src/errors.rs

//! Crate-wide error types.
//!
//! [`SchedulerError`] covers everything that stops a run (or stops it from
//! starting). A node whose work fails is *not* a scheduler error: that is
//! recorded as a [`NodeExecutionError`] on the node and reported back in the
//! execution report.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Cycle detected in node graph: {0}")]
    CycleDetected(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Node '{node}' depends on unknown node '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("Resource lock inconsistency: node '{holder}' released '{key}' without holding it")]
    ResourceLockInconsistency { key: String, holder: String },

    #[error("Scheduling starvation: no node running and none dispatchable, pending: {pending:?}")]
    SchedulingStarvation { pending: Vec<String> },

    #[error("Invalid state for node '{node}': expected {expected}, found {found}")]
    InvalidState {
        node: String,
        expected: &'static str,
        found: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure detail attached to a node that ended `Failed`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeExecutionError {
    /// The work item returned an error.
    #[error("work failed: {0}")]
    Failed(String),

    /// The work item panicked.
    #[error("work panicked: {0}")]
    Panicked(String),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SchedulerError>;
