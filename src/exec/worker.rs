// src/exec/worker.rs

//! Admission and dispatch of a single ready node.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::dag::{DependencyGraph, NodeId};
use crate::engine::CancelSignal;
use crate::errors::{NodeExecutionError, Result};
use crate::lease::{WorkerLease, WorkerLeaseService};
use crate::locks::HeldLocks;

use super::work::{WorkContext, WorkItem};

/// Outcome of one admission attempt.
///
/// Only `Started` moves the node forward; the other two are routine signals
/// telling the coordinator why the node has to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSchedulingResult {
    Started,
    /// Every worker lease is in use.
    NoWorkerLease,
    /// The node needs resources that were not supplied.
    NoResourceLock,
}

/// Sent by a node's task once its work has finished, whatever the outcome.
#[derive(Debug)]
pub struct CompletionEvent {
    pub node: NodeId,
    pub outcome: std::result::Result<(), NodeExecutionError>,
    /// The grants the node ran under, for the coordinator to release.
    pub locks: Option<HeldLocks>,
    pub elapsed: Duration,
}

/// Decides whether a ready node can start now, and starts it.
///
/// The worker owns the session's lease pool and the sending half of the
/// completion channel. Dispatched tasks never touch the graph or the lock
/// registry: they give back their lease and report through the channel.
#[derive(Debug)]
pub struct NodeExecutionWorker {
    leases: WorkerLeaseService,
    completions: mpsc::Sender<CompletionEvent>,
    cancel: CancelSignal,
}

impl NodeExecutionWorker {
    pub fn new(
        leases: WorkerLeaseService,
        completions: mpsc::Sender<CompletionEvent>,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            leases,
            completions,
            cancel,
        }
    }

    pub fn leases(&self) -> &WorkerLeaseService {
        &self.leases
    }

    /// Try to start `node`, which must be `Ready`.
    ///
    /// - No free lease: returns `NoWorkerLease` and leaves `lock` untouched.
    /// - Lease obtained but `lock` does not cover the node's requirements: the
    ///   lease is given back at once and `NoResourceLock` is returned, again
    ///   leaving `lock` to the caller. A lease is never held while waiting on
    ///   a resource.
    /// - Otherwise the node is marked `Running`, `lock` is taken, the work is
    ///   spawned and `Started` is returned without waiting for it.
    ///
    /// A node that is not `Ready` fails with `InvalidState`; the lease is given
    /// back and `lock` stays with the caller.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(
        &mut self,
        graph: &mut DependencyGraph,
        node: NodeId,
        lock: &mut Option<HeldLocks>,
    ) -> Result<NodeSchedulingResult> {
        let Some(lease) = self.leases.try_acquire_lease() else {
            debug!(node = %graph.name_of(node), "no worker lease available");
            return Ok(NodeSchedulingResult::NoWorkerLease);
        };

        let requirements = graph.node(node).requirements();
        let covered = requirements.is_empty()
            || lock
                .as_ref()
                .is_some_and(|held| held.covers(node, requirements));
        if !covered {
            lease.release();
            debug!(
                node = %graph.name_of(node),
                "resource lock not held; lease returned"
            );
            return Ok(NodeSchedulingResult::NoResourceLock);
        }

        graph.mark_running(node)?;

        let name = graph.name_of(node).to_string();
        let work = Arc::clone(graph.node(node).work());
        self.spawn(node, name, work, lease, lock.take());

        Ok(NodeSchedulingResult::Started)
    }

    fn spawn(
        &self,
        node: NodeId,
        name: String,
        work: Arc<dyn WorkItem>,
        lease: WorkerLease,
        locks: Option<HeldLocks>,
    ) {
        let tx = self.completions.clone();
        let ctx = WorkContext::new(name.clone(), self.cancel.clone());

        tokio::spawn(async move {
            let started = Instant::now();

            // Nested task so that a panicking work item surfaces as a JoinError
            // here instead of taking this task (and the completion) with it.
            let joined = tokio::spawn(async move { work.run(ctx).await }).await;

            let outcome = match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(NodeExecutionError::Failed(format!("{err:#}"))),
                Err(join_err) if join_err.is_panic() => {
                    let msg = panic_message(join_err.into_panic());
                    error!(node = %name, panic = %msg, "work panicked");
                    Err(NodeExecutionError::Panicked(msg))
                }
                Err(join_err) => Err(NodeExecutionError::Failed(format!(
                    "work task cancelled: {join_err}"
                ))),
            };
            let elapsed = started.elapsed();

            // Give the lease back before reporting, so the coordinator sees the
            // capacity as soon as it handles this completion.
            lease.release();

            let event = CompletionEvent {
                node,
                outcome,
                locks,
                elapsed,
            };
            if tx.send(event).await.is_err() {
                warn!(node = %name, "coordinator gone; completion dropped");
            }
        });
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
