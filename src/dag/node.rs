// src/dag/node.rs

//! Node descriptors, node identity and per-node run state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::NodeExecutionError;
use crate::exec::WorkItem;
use crate::types::AccessMode;

/// Dense index of a node inside its [`DependencyGraph`](crate::dag::DependencyGraph).
///
/// Indices follow declaration order, so comparing two ids compares their
/// dispatch priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Lifecycle of a node within one execution session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Waiting on at least one unresolved dependency.
    Pending,
    /// Every dependency is resolved; eligible for dispatch.
    Ready,
    /// Holds a worker lease and its work is executing.
    Running,
    Completed,
    Failed,
    /// Never ran: an upstream failure, fail-fast or cancellation ruled it out.
    Skipped,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeState::Completed | NodeState::Failed | NodeState::Skipped
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeState::Pending => "pending",
            NodeState::Ready => "ready",
            NodeState::Running => "running",
            NodeState::Completed => "completed",
            NodeState::Failed => "failed",
            NodeState::Skipped => "skipped",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named resource the node must hold, in the given mode, while it runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRequirement {
    pub key: String,
    pub mode: AccessMode,
}

impl ResourceRequirement {
    pub fn exclusive(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            mode: AccessMode::Exclusive,
        }
    }

    pub fn shared(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            mode: AccessMode::Shared,
        }
    }
}

/// Input to [`DependencyGraph::build`](crate::dag::DependencyGraph::build).
///
/// ```ignore
/// NodeDescriptor::new("link", work)
///     .after("compile")
///     .exclusive("out/app");
/// ```
#[derive(Clone)]
pub struct NodeDescriptor {
    pub id: String,
    /// Dependency ids, in priority order.
    pub dependencies: Vec<String>,
    pub requirements: Vec<ResourceRequirement>,
    pub work: Arc<dyn WorkItem>,
}

impl NodeDescriptor {
    pub fn new(id: impl Into<String>, work: Arc<dyn WorkItem>) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            requirements: Vec::new(),
            work,
        }
    }

    pub fn after(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn exclusive(mut self, key: impl Into<String>) -> Self {
        self.requirements.push(ResourceRequirement::exclusive(key));
        self
    }

    pub fn shared(mut self, key: impl Into<String>) -> Self {
        self.requirements.push(ResourceRequirement::shared(key));
        self
    }
}

impl fmt::Debug for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDescriptor")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("requirements", &self.requirements)
            .finish_non_exhaustive()
    }
}

/// A node as stored in the graph arena.
pub struct Node {
    pub(crate) name: String,
    pub(crate) work: Arc<dyn WorkItem>,
    pub(crate) deps: Vec<NodeId>,
    pub(crate) dependents: Vec<NodeId>,
    pub(crate) requirements: Vec<ResourceRequirement>,
    pub(crate) state: NodeState,
    pub(crate) failure: Option<NodeExecutionError>,
    /// Dependencies not yet resolved for this session.
    pub(crate) unresolved: usize,
    pub(crate) elapsed: Option<Duration>,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Present iff the node is `Failed`.
    pub fn failure(&self) -> Option<&NodeExecutionError> {
        self.failure.as_ref()
    }

    pub fn requirements(&self) -> &[ResourceRequirement] {
        &self.requirements
    }

    pub fn work(&self) -> &Arc<dyn WorkItem> {
        &self.work
    }

    pub fn dependencies(&self) -> &[NodeId] {
        &self.deps
    }

    pub fn dependents(&self) -> &[NodeId] {
        &self.dependents
    }

    /// Wall-clock time the work took, once it has run.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .field("requirements", &self.requirements)
            .field("state", &self.state)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}
