// src/config/validate.rs

use std::collections::{HashMap, HashSet};

use crate::config::model::{ConfigFile, RawConfigFile, parse_duration};
use crate::dag::graph::ensure_acyclic;
use crate::errors::{Result, SchedulerError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SchedulerError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.node))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_nodes(cfg)?;
    validate_global_config(cfg)?;
    validate_node_ids(cfg)?;
    validate_node_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_nodes(cfg: &RawConfigFile) -> Result<()> {
    if cfg.node.is_empty() {
        return Err(SchedulerError::ConfigError(
            "config must contain at least one [[node]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    // failure_policy is strongly typed and checked during deserialization.

    if cfg.config.max_workers == Some(0) {
        return Err(SchedulerError::ConfigError(
            "[config].max_workers must be >= 1 (got 0)".to_string(),
        ));
    }

    if let Some(ref deadline) = cfg.config.deadline {
        parse_duration(deadline)?;
    }

    Ok(())
}

fn validate_node_ids(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for node in &cfg.node {
        if node.id.trim().is_empty() {
            return Err(SchedulerError::ConfigError(
                "node id must not be empty".to_string(),
            ));
        }
        if !seen.insert(node.id.as_str()) {
            return Err(SchedulerError::DuplicateNode(node.id.clone()));
        }
    }
    Ok(())
}

fn validate_node_dependencies(cfg: &RawConfigFile) -> Result<()> {
    let ids: HashSet<&str> = cfg.node.iter().map(|n| n.id.as_str()).collect();
    for node in &cfg.node {
        for dep in &node.after {
            if !ids.contains(dep.as_str()) {
                return Err(SchedulerError::ConfigError(format!(
                    "node '{}' has unknown dependency '{}' in `after`",
                    node.id, dep
                )));
            }
            if dep == &node.id {
                return Err(SchedulerError::ConfigError(format!(
                    "node '{}' cannot depend on itself in `after`",
                    node.id
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    let position: HashMap<&str, usize> = cfg
        .node
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let edges: Vec<(usize, usize)> = cfg
        .node
        .iter()
        .enumerate()
        .flat_map(|(i, n)| n.after.iter().map(move |dep| (dep.as_str(), i)))
        .filter_map(|(dep, i)| position.get(dep).map(|&d| (d, i)))
        .collect();

    ensure_acyclic(cfg.node.len(), &edges, |i| cfg.node[i].id.as_str())
}
