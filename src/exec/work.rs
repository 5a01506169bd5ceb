// src/exec/work.rs

//! The opaque unit of work a node carries.
//!
//! The scheduler never looks inside a work item: it runs it once, on its own
//! task, and records whether it returned `Ok` or `Err` (or panicked).

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::engine::CancelSignal;

/// Future returned by [`WorkItem::run`].
pub type WorkFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// Something a node does when it runs.
pub trait WorkItem: Send + Sync + 'static {
    fn run(&self, ctx: WorkContext) -> WorkFuture<'_>;

    /// Short human-readable description, used by dry runs and logs.
    fn describe(&self) -> String {
        "<opaque work>".to_string()
    }
}

/// Per-execution information handed to a running work item.
#[derive(Debug, Clone)]
pub struct WorkContext {
    node: String,
    cancel: CancelSignal,
}

impl WorkContext {
    pub fn new(node: impl Into<String>, cancel: CancelSignal) -> Self {
        Self {
            node: node.into(),
            cancel,
        }
    }

    /// Id of the node this work belongs to.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Whether the run has been cancelled (or hit its deadline).
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the run is cancelled.
    pub async fn cancelled(&mut self) {
        self.cancel.cancelled().await
    }
}

/// Work backed by an async closure.
pub struct FnWork<F> {
    f: F,
    label: String,
}

impl<F, Fut> FnWork<F>
where
    F: Fn(WorkContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    pub fn new(label: impl Into<String>, f: F) -> Self {
        Self {
            f,
            label: label.into(),
        }
    }
}

impl<F, Fut> WorkItem for FnWork<F>
where
    F: Fn(WorkContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn run(&self, ctx: WorkContext) -> WorkFuture<'_> {
        Box::pin((self.f)(ctx))
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

impl<F> fmt::Debug for FnWork<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnWork")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Shorthand for `Arc::new(FnWork::new(label, f))`.
pub fn work_fn<F, Fut>(label: impl Into<String>, f: F) -> Arc<dyn WorkItem>
where
    F: Fn(WorkContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnWork::new(label, f))
}
