// src/config/model.rs

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::{DependencyGraph, NodeDescriptor};
use crate::engine::ExecutionConfig;
use crate::errors::{Result, SchedulerError};
use crate::exec::ShellCommand;
use crate::lease::host_parallelism;
use crate::types::FailurePolicy;

/// Graph file exactly as deserialized from TOML, before validation.
///
/// ```toml
/// [config]
/// max_workers = 4
/// failure_policy = "continue"
/// deadline = "10m"
///
/// [[node]]
/// id = "compile"
/// cmd = "cc -c main.c"
/// after = ["generate"]
/// exclusive = ["build-dir"]
/// ```
///
/// Nodes are an array of tables so that declaration order (which is also
/// dispatch priority) survives parsing.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub node: Vec<NodeConfig>,
}

/// Validated graph file. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub node: Vec<NodeConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(config: ConfigSection, node: Vec<NodeConfig>) -> Self {
        Self { config, node }
    }

    /// Execution settings from `[config]`.
    pub fn execution_config(&self) -> Result<ExecutionConfig> {
        let max_workers = match self.config.max_workers {
            Some(n) => NonZeroUsize::new(n).ok_or_else(|| {
                SchedulerError::ConfigError("[config].max_workers must be >= 1 (got 0)".to_string())
            })?,
            None => host_parallelism(),
        };
        let deadline = self
            .config
            .deadline
            .as_deref()
            .map(parse_duration)
            .transpose()?;

        Ok(ExecutionConfig {
            max_workers,
            failure_policy: self.config.failure_policy,
            deadline,
        })
    }

    /// One descriptor per `[[node]]`, each running its `cmd` through the shell.
    pub fn descriptors(&self) -> Vec<NodeDescriptor> {
        self.node
            .iter()
            .map(|n| {
                let mut desc = NodeDescriptor::new(n.id.clone(), Arc::new(ShellCommand::new(&n.cmd)));
                for dep in &n.after {
                    desc = desc.after(dep.clone());
                }
                for key in &n.exclusive {
                    desc = desc.exclusive(key.clone());
                }
                for key in &n.shared {
                    desc = desc.shared(key.clone());
                }
                desc
            })
            .collect()
    }

    pub fn build_graph(&self) -> Result<DependencyGraph> {
        DependencyGraph::build(self.descriptors())
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigSection {
    /// Worker lease pool size. Defaults to host parallelism.
    #[serde(default)]
    pub max_workers: Option<usize>,

    /// `"fail-fast"` (default) or `"continue"`.
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Stop dispatching after this long, e.g. `"30s"`, `"500ms"`, `"5m"`.
    #[serde(default)]
    pub deadline: Option<String>,
}

/// `[[node]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub id: String,

    /// Shell command line to run.
    pub cmd: String,

    /// Nodes that must finish first, in priority order.
    #[serde(default)]
    pub after: Vec<String>,

    /// Resource keys this node needs to itself while running.
    #[serde(default)]
    pub exclusive: Vec<String>,

    /// Resource keys this node may share with other shared holders.
    #[serde(default)]
    pub shared: Vec<String>,
}

/// Parse `"250ms"`, `"30s"`, `"2m"` or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let invalid = || {
        SchedulerError::ConfigError(format!(
            "invalid duration '{s}' (expected e.g. \"500ms\", \"30s\", \"5m\")"
        ))
    };

    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => s.split_at(pos),
        None => (s, "s"),
    };
    let value: u64 = digits.parse().map_err(|_| invalid())?;

    match unit.trim() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => value
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}
