// src/dag/mod.rs

//! Node graph representation and per-session node state.
//!
//! - [`graph`] holds the arena of nodes, adjacency in both directions, and the
//!   readiness / skip-propagation rules.
//! - [`node`] defines node descriptors, identity and state.
//! - [`graph_step`] defines the result type for a single state transition.

pub mod graph;
pub mod graph_step;
pub mod node;

pub use graph::DependencyGraph;
pub use graph_step::GraphStep;
pub use node::{Node, NodeDescriptor, NodeId, NodeState, ResourceRequirement};
