// src/engine/report.rs

//! Final, user-facing result of one execution session.

use std::fmt::Write as _;
use std::time::Duration;

use crate::dag::{DependencyGraph, NodeId, NodeState};
use crate::errors::NodeExecutionError;

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every node reached a terminal state on its own.
    AllDone,
    /// Dispatch was stopped early (cancellation or deadline) and in-flight work
    /// was drained.
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeReport {
    pub id: String,
    pub state: NodeState,
    /// Present iff `state` is `Failed`.
    pub failure: Option<NodeExecutionError>,
    pub elapsed: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub outcome: RunOutcome,
    /// One entry per node, in declaration order.
    pub nodes: Vec<NodeReport>,
    /// Node ids in the order they were started.
    pub dispatch_order: Vec<String>,
    /// Highest number of worker leases held at once.
    pub peak_workers: usize,
    /// `AllDone` and every node `Completed`.
    pub success: bool,
}

impl ExecutionReport {
    pub(crate) fn from_graph(
        graph: &DependencyGraph,
        outcome: RunOutcome,
        dispatch_order: &[NodeId],
        peak_workers: usize,
    ) -> Self {
        let nodes: Vec<NodeReport> = graph
            .ids()
            .map(|id| {
                let node = graph.node(id);
                NodeReport {
                    id: node.name().to_string(),
                    state: node.state(),
                    failure: node.failure().cloned(),
                    elapsed: node.elapsed(),
                }
            })
            .collect();

        let success = outcome == RunOutcome::AllDone
            && nodes.iter().all(|n| n.state == NodeState::Completed);

        Self {
            outcome,
            nodes,
            dispatch_order: dispatch_order
                .iter()
                .map(|id| graph.name_of(*id).to_string())
                .collect(),
            peak_workers,
            success,
        }
    }

    pub fn node(&self, id: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn state_of(&self, id: &str) -> Option<NodeState> {
        self.node(id).map(|n| n.state)
    }

    pub fn failed(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes.iter().filter(|n| n.state == NodeState::Failed)
    }

    pub fn count(&self, state: NodeState) -> usize {
        self.nodes.iter().filter(|n| n.state == state).count()
    }

    /// Plain-text summary for the CLI.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "workgraph: {:?} ({} completed, {} failed, {} skipped, peak workers {})",
            self.outcome,
            self.count(NodeState::Completed),
            self.count(NodeState::Failed),
            self.count(NodeState::Skipped),
            self.peak_workers,
        );
        for n in &self.nodes {
            let _ = write!(out, "  {:<24} {}", n.id, n.state);
            if let Some(elapsed) = n.elapsed {
                let _ = write!(out, " ({:.2?})", elapsed);
            }
            if let Some(ref failure) = n.failure {
                let _ = write!(out, ": {failure}");
            }
            out.push('\n');
        }
        out
    }
}
