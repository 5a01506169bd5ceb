// src/dag/graph_step.rs

//! Result type for a single graph state transition.

use crate::dag::NodeId;

/// What changed in the graph as a result of recording one node's outcome.
///
/// Useful for tests that drive the graph by hand and for the coordinator's
/// logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStep {
    /// Nodes whose last unresolved dependency was just resolved.
    pub newly_ready: Vec<NodeId>,
    /// Nodes newly marked `Skipped` because of this transition.
    pub newly_skipped: Vec<NodeId>,
}
