// src/engine/core.rs

//! Synchronous scheduling core.
//!
//! [`SchedulingCore`] owns everything a run mutates: the dependency graph, the
//! lock registry and (through its [`NodeExecutionWorker`]) the lease pool.
//! Holding `&mut SchedulingCore` *is* the scheduling critical section. Nothing
//! in here awaits; the async shell in [`runtime`](super::runtime) waits for
//! completions and feeds them back in.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::{DependencyGraph, NodeId};
use crate::engine::cancel::{CancelHandle, cancel_pair};
use crate::engine::report::{ExecutionReport, RunOutcome};
use crate::engine::ExecutionConfig;
use crate::errors::{Result, SchedulerError};
use crate::exec::{CompletionEvent, NodeExecutionWorker, NodeSchedulingResult};
use crate::lease::WorkerLeaseService;
use crate::locks::{HeldLocks, ResourceLockRegistry};
use crate::types::FailurePolicy;

/// Why dispatch was stopped before the graph finished on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    DeadlineElapsed,
    /// A fatal scheduler error; in-flight work is drained before it is returned.
    Fatal,
}

/// What one scheduling pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub started: Vec<NodeId>,
    /// Nodes that were ready but could not get their resource locks.
    pub lock_blocked: Vec<NodeId>,
    /// The pass ended early because the lease pool was exhausted.
    pub lease_exhausted: bool,
}

/// Per-session scheduling state. See the module docs.
#[derive(Debug)]
pub struct SchedulingCore {
    graph: DependencyGraph,
    locks: ResourceLockRegistry,
    worker: NodeExecutionWorker,
    policy: FailurePolicy,
    failure_observed: bool,
    stop_reason: Option<StopReason>,
    dispatch_order: Vec<NodeId>,
    /// Fires the cancellation seen by running work items.
    work_cancel: CancelHandle,
}

impl SchedulingCore {
    /// Create the core plus the receiving end of its completion channel.
    ///
    /// Each call builds a fresh lease pool and lock registry, so independent
    /// sessions never share accounting.
    pub fn new(
        graph: DependencyGraph,
        config: &ExecutionConfig,
    ) -> (Self, mpsc::Receiver<CompletionEvent>) {
        // Sized to the pool; a worker may still wait briefly on send, since its
        // lease goes back before the event is queued.
        let (tx, rx) = mpsc::channel(config.max_workers.get());
        let (work_cancel, work_signal) = cancel_pair();
        let worker = NodeExecutionWorker::new(
            WorkerLeaseService::new(config.max_workers),
            tx,
            work_signal,
        );

        let core = Self {
            graph,
            locks: ResourceLockRegistry::new(),
            worker,
            policy: config.failure_policy,
            failure_observed: false,
            stop_reason: None,
            dispatch_order: Vec::new(),
            work_cancel,
        };
        (core, rx)
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn locks(&self) -> &ResourceLockRegistry {
        &self.locks
    }

    pub fn leases(&self) -> &WorkerLeaseService {
        self.worker.leases()
    }

    pub fn is_finished(&self) -> bool {
        self.graph.is_finished()
    }

    pub fn running(&self) -> usize {
        self.graph.running_count()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Whether new dispatch is currently allowed.
    pub fn dispatch_open(&self) -> bool {
        self.stop_reason.is_none()
            && !(self.policy == FailurePolicy::FailFast && self.failure_observed)
    }

    /// One scheduling pass: try to start every ready node, in declaration order.
    ///
    /// Fails with [`SchedulerError::SchedulingStarvation`] if nothing could be
    /// started, nothing is running, and the graph is not finished: with correct
    /// lease and lock accounting that state cannot be reached.
    pub fn run_pass(&mut self) -> Result<PassSummary> {
        let mut summary = PassSummary::default();
        if !self.dispatch_open() {
            return Ok(summary);
        }

        for node in self.graph.ready_nodes() {
            let requirements = self.graph.node(node).requirements();
            let mut lock = if requirements.is_empty() {
                None
            } else {
                self.locks.try_acquire_all(requirements, node)
            };

            let scheduled = match self.worker.schedule(&mut self.graph, node, &mut lock) {
                Ok(scheduled) => scheduled,
                Err(err) => {
                    // The node did not start, so its grants are still ours.
                    if let Err(release_err) = self.release_unused(lock) {
                        warn!(error = %release_err, "releasing locks of unstarted node failed");
                    }
                    return Err(err);
                }
            };

            match scheduled {
                NodeSchedulingResult::Started => {
                    info!(node = %self.graph.name_of(node), "node started");
                    self.dispatch_order.push(node);
                    summary.started.push(node);
                }
                NodeSchedulingResult::NoWorkerLease => {
                    self.release_unused(lock)?;
                    // Leases are interchangeable; the rest of the pass would fail too.
                    summary.lease_exhausted = true;
                    break;
                }
                NodeSchedulingResult::NoResourceLock => {
                    self.release_unused(lock)?;
                    debug!(
                        node = %self.graph.name_of(node),
                        "resource lock unavailable; retrying next pass"
                    );
                    summary.lock_blocked.push(node);
                }
            }
        }

        if summary.started.is_empty()
            && self.graph.running_count() == 0
            && !self.graph.is_finished()
        {
            return Err(SchedulerError::SchedulingStarvation {
                pending: self.graph.unfinished(),
            });
        }

        Ok(summary)
    }

    /// Record a finished node: release its locks, update the graph and apply
    /// the failure policy.
    pub fn apply_completion(&mut self, event: CompletionEvent) -> Result<()> {
        let CompletionEvent {
            node,
            outcome,
            locks,
            elapsed,
        } = event;

        self.graph.record_elapsed(node, elapsed);
        let failed = outcome.is_err();
        if let Err(ref err) = outcome {
            warn!(node = %self.graph.name_of(node), error = %err, "node failed");
        } else {
            info!(node = %self.graph.name_of(node), ?elapsed, "node completed");
        }

        // Graph first: the node must stop counting as running even if its
        // lock release turns out to be inconsistent.
        let step = self.graph.mark_completed(node, outcome)?;
        if !step.newly_ready.is_empty() {
            debug!(
                node = %self.graph.name_of(node),
                newly_ready = ?self.names(&step.newly_ready),
                "dependents ready"
            );
        }
        if !step.newly_skipped.is_empty() {
            warn!(
                node = %self.graph.name_of(node),
                skipped = ?self.names(&step.newly_skipped),
                "skipping dependents of failed node"
            );
        }

        if failed && !self.failure_observed {
            self.failure_observed = true;
            if self.policy == FailurePolicy::FailFast {
                let skipped = self.graph.skip_unstarted();
                warn!(
                    node = %self.graph.name_of(node),
                    skipped = ?self.names(&skipped),
                    running = self.graph.running_count(),
                    "fail-fast: no further dispatch; waiting for running nodes"
                );
            }
        }

        if let Some(locks) = locks {
            self.locks.release_all(locks)?;
        }
        Ok(())
    }

    /// Stop dispatching. Unstarted nodes are skipped and running work is told
    /// (cooperatively) that the run is over. The first reason given wins.
    pub fn stop(&mut self, reason: StopReason) {
        if self.stop_reason.is_some() {
            return;
        }
        self.stop_reason = Some(reason);
        self.work_cancel.cancel();
        let skipped = self.graph.skip_unstarted();
        warn!(
            ?reason,
            skipped = skipped.len(),
            running = self.graph.running_count(),
            "dispatch stopped; draining running nodes"
        );
    }

    /// Consume the core and produce the session report.
    pub fn into_report(self) -> ExecutionReport {
        let outcome = match self.stop_reason {
            None => RunOutcome::AllDone,
            Some(_) => RunOutcome::Aborted,
        };
        ExecutionReport::from_graph(
            &self.graph,
            outcome,
            &self.dispatch_order,
            self.worker.leases().peak(),
        )
    }

    /// Give back a lock that was acquired for a node that did not start.
    fn release_unused(&mut self, lock: Option<HeldLocks>) -> Result<()> {
        match lock {
            Some(held) => self.locks.release_all(held),
            None => Ok(()),
        }
    }

    fn names(&self, ids: &[NodeId]) -> Vec<&str> {
        ids.iter().map(|id| self.graph.name_of(*id)).collect()
    }
}
