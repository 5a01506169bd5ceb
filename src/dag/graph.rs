// src/dag/graph.rs

use std::collections::HashMap;
use std::time::Duration;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::graph_step::GraphStep;
use crate::dag::node::{Node, NodeDescriptor, NodeId, NodeState, ResourceRequirement};
use crate::errors::{NodeExecutionError, Result, SchedulerError};
use crate::types::AccessMode;

/// Arena of nodes plus forward and reverse adjacency, keyed by [`NodeId`].
///
/// The graph owns every node for the duration of one execution session. It is
/// only mutated by the coordinator; worker tasks never see it.
#[derive(Debug)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    index: HashMap<String, NodeId>,
}

impl DependencyGraph {
    /// Build a graph from node descriptors, validating it on the way.
    ///
    /// Fails with:
    /// - [`SchedulerError::DuplicateNode`] if an id is declared twice,
    /// - [`SchedulerError::UnknownDependency`] if a dependency is not declared,
    /// - [`SchedulerError::CycleDetected`] if the dependency relation is cyclic.
    ///
    /// Nodes without dependencies start out `Ready`, everything else `Pending`.
    pub fn build(descriptors: Vec<NodeDescriptor>) -> Result<Self> {
        let mut index = HashMap::with_capacity(descriptors.len());
        for (i, desc) in descriptors.iter().enumerate() {
            if index.insert(desc.id.clone(), NodeId::new(i)).is_some() {
                return Err(SchedulerError::DuplicateNode(desc.id.clone()));
            }
        }

        let mut nodes: Vec<Node> = Vec::with_capacity(descriptors.len());
        for desc in descriptors {
            let mut deps: Vec<NodeId> = Vec::with_capacity(desc.dependencies.len());
            for dep in &desc.dependencies {
                let dep_id = index.get(dep).copied().ok_or_else(|| {
                    SchedulerError::UnknownDependency {
                        node: desc.id.clone(),
                        dependency: dep.clone(),
                    }
                })?;
                if dep == &desc.id {
                    return Err(SchedulerError::CycleDetected(format!(
                        "node '{}' depends on itself",
                        desc.id
                    )));
                }
                if !deps.contains(&dep_id) {
                    deps.push(dep_id);
                }
            }

            let unresolved = deps.len();
            nodes.push(Node {
                name: desc.id,
                work: desc.work,
                deps,
                dependents: Vec::new(),
                requirements: normalize_requirements(desc.requirements),
                state: if unresolved == 0 {
                    NodeState::Ready
                } else {
                    NodeState::Pending
                },
                failure: None,
                unresolved,
                elapsed: None,
            });
        }

        // Second pass: reverse adjacency.
        for i in 0..nodes.len() {
            let deps = nodes[i].deps.clone();
            for dep in deps {
                nodes[dep.index()].dependents.push(NodeId::new(i));
            }
        }

        let edges: Vec<(usize, usize)> = nodes
            .iter()
            .enumerate()
            .flat_map(|(i, n)| n.deps.iter().map(move |d| (d.index(), i)))
            .collect();
        ensure_acyclic(nodes.len(), &edges, |i| nodes[i].name.as_str())?;

        debug!(nodes = nodes.len(), edges = edges.len(), "dependency graph built");

        Ok(Self { nodes, index })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId::new)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    pub fn name_of(&self, id: NodeId) -> &str {
        &self.nodes[id.index()].name
    }

    pub fn state_of(&self, name: &str) -> Option<NodeState> {
        self.id_of(name).map(|id| self.node(id).state)
    }

    pub fn dependencies_of(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].deps
    }

    pub fn dependents_of(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].dependents
    }

    /// `Ready` nodes in ascending declaration order.
    pub fn ready_nodes(&self) -> Vec<NodeId> {
        self.ids()
            .filter(|id| self.node(*id).state == NodeState::Ready)
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.state == NodeState::Running)
            .count()
    }

    /// Names of nodes that have not reached a terminal state.
    pub fn unfinished(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| !n.state.is_terminal())
            .map(|n| n.name.clone())
            .collect()
    }

    /// Every node is `Completed`, `Failed` or `Skipped`.
    pub fn is_finished(&self) -> bool {
        self.nodes.iter().all(|n| n.state.is_terminal())
    }

    /// `Ready` → `Running`.
    pub fn mark_running(&mut self, id: NodeId) -> Result<()> {
        self.expect_state(id, NodeState::Ready, "ready")?;
        let node = &mut self.nodes[id.index()];
        node.state = NodeState::Running;
        debug!(node = %node.name, "marked Running");
        Ok(())
    }

    /// Record the outcome of a running node.
    ///
    /// A successful node resolves its dependents. A failed node never does:
    /// its transitive dependents are marked `Skipped`, whatever the failure
    /// policy. The policy only decides whether unrelated nodes keep running,
    /// which is the coordinator's call.
    pub fn mark_completed(
        &mut self,
        id: NodeId,
        outcome: std::result::Result<(), NodeExecutionError>,
    ) -> Result<GraphStep> {
        self.expect_state(id, NodeState::Running, "running")?;

        let failed = outcome.is_err();
        {
            let node = &mut self.nodes[id.index()];
            match outcome {
                Ok(()) => {
                    node.state = NodeState::Completed;
                    debug!(node = %node.name, "marked Completed");
                }
                Err(err) => {
                    debug!(node = %node.name, error = %err, "marked Failed");
                    node.state = NodeState::Failed;
                    node.failure = Some(err);
                }
            }
        }

        let mut step = GraphStep::default();
        if failed {
            step.newly_skipped = self.skip_dependents(id);
        } else {
            step.newly_ready = self.resolve_dependents(id);
        }
        Ok(step)
    }

    /// Mark every `Pending` or `Ready` node `Skipped`, returning them.
    pub fn skip_unstarted(&mut self) -> Vec<NodeId> {
        let mut skipped = Vec::new();
        for (i, node) in self.nodes.iter_mut().enumerate() {
            if matches!(node.state, NodeState::Pending | NodeState::Ready) {
                node.state = NodeState::Skipped;
                skipped.push(NodeId::new(i));
            }
        }
        skipped
    }

    pub(crate) fn record_elapsed(&mut self, id: NodeId, elapsed: Duration) {
        self.nodes[id.index()].elapsed = Some(elapsed);
    }

    fn resolve_dependents(&mut self, id: NodeId) -> Vec<NodeId> {
        let mut newly_ready = Vec::new();
        let dependents = self.nodes[id.index()].dependents.clone();
        for dep_id in dependents {
            let node = &mut self.nodes[dep_id.index()];
            if node.state != NodeState::Pending {
                continue;
            }
            node.unresolved -= 1;
            if node.unresolved == 0 {
                node.state = NodeState::Ready;
                debug!(node = %node.name, "dependencies resolved; marked Ready");
                newly_ready.push(dep_id);
            }
        }
        newly_ready.sort();
        newly_ready
    }

    /// Mark the transitive dependents of a failed node `Skipped`.
    fn skip_dependents(&mut self, failed: NodeId) -> Vec<NodeId> {
        let mut stack: Vec<NodeId> = self.nodes[failed.index()].dependents.clone();
        let mut skipped = Vec::new();

        while let Some(id) = stack.pop() {
            let node = &mut self.nodes[id.index()];
            match node.state {
                NodeState::Pending | NodeState::Ready => {
                    node.state = NodeState::Skipped;
                    debug!(node = %node.name, "upstream failure; marked Skipped");
                    skipped.push(id);
                    stack.extend(node.dependents.iter().copied());
                }
                // Already terminal, or reached through another path.
                NodeState::Running
                | NodeState::Completed
                | NodeState::Failed
                | NodeState::Skipped => {}
            }
        }

        skipped.sort();
        skipped
    }

    fn expect_state(&self, id: NodeId, expected: NodeState, label: &'static str) -> Result<()> {
        let node = &self.nodes[id.index()];
        if node.state != expected {
            return Err(SchedulerError::InvalidState {
                node: node.name.clone(),
                expected: label,
                found: node.state.to_string(),
            });
        }
        Ok(())
    }
}

/// Fail with [`SchedulerError::CycleDetected`] if the edges `(from, to)` over
/// nodes `0..count` contain a cycle.
pub(crate) fn ensure_acyclic<'a>(
    count: usize,
    edges: &[(usize, usize)],
    name_of: impl Fn(usize) -> &'a str,
) -> Result<()> {
    // Edge direction: dependency -> dependent.
    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
    for i in 0..count {
        graph.add_node(i);
    }
    for &(from, to) in edges {
        graph.add_edge(from, to, ());
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(SchedulerError::CycleDetected(format!(
            "cycle detected in node graph involving node '{}'",
            name_of(cycle.node_id())
        ))),
    }
}

/// Collapse repeated keys into one requirement; exclusive wins over shared.
fn normalize_requirements(requirements: Vec<ResourceRequirement>) -> Vec<ResourceRequirement> {
    let mut merged: Vec<ResourceRequirement> = Vec::with_capacity(requirements.len());
    for req in requirements {
        match merged.iter_mut().find(|r| r.key == req.key) {
            Some(existing) => {
                if req.mode == AccessMode::Exclusive {
                    existing.mode = AccessMode::Exclusive;
                }
            }
            None => merged.push(req),
        }
    }
    merged
}
