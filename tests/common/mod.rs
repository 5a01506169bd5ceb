#![allow(dead_code)]

pub use workgraph_test_utils::builders;
pub use workgraph_test_utils::recording::{ExecutionLog, LogEvent, RecordingGraph, WorkSpec};
pub use workgraph_test_utils::{config, init_tracing, with_timeout, workers};

use std::sync::Arc;

use workgraph::exec::work_fn;
use workgraph::{NodeDescriptor, NodeId, WorkItem};

/// Work that succeeds immediately.
pub fn noop() -> Arc<dyn WorkItem> {
    work_fn("noop", |_ctx| async { anyhow::Ok(()) })
}

/// A descriptor running [`noop`].
pub fn node(id: &str) -> NodeDescriptor {
    NodeDescriptor::new(id, noop())
}

/// Look a node id up by name; panics if absent.
pub fn id(graph: &workgraph::DependencyGraph, name: &str) -> NodeId {
    graph
        .id_of(name)
        .unwrap_or_else(|| panic!("no node named '{name}'"))
}
