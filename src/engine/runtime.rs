// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info};

use crate::dag::DependencyGraph;
use crate::errors::{Result, SchedulerError};
use crate::exec::CompletionEvent;

use super::cancel::CancelSignal;
use super::core::{SchedulingCore, StopReason};
use super::report::ExecutionReport;
use super::ExecutionConfig;

/// What woke the coordinator up while it was waiting.
enum Wake {
    Completion(Option<CompletionEvent>),
    Cancelled,
    DeadlineElapsed,
}

/// Drives a [`SchedulingCore`] to completion.
///
/// This is the async shell around the core: it runs scheduling passes, and
/// between passes it waits (outside the critical section) for the next
/// completion, a cancellation request, or the deadline.
pub struct Coordinator {
    core: SchedulingCore,
    completions: mpsc::Receiver<CompletionEvent>,
    cancel: CancelSignal,
    deadline: Option<Instant>,
    config: ExecutionConfig,
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("core", &self.core)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    pub fn new(graph: DependencyGraph, config: ExecutionConfig) -> Self {
        Self::with_cancel(graph, config, CancelSignal::never())
    }

    pub fn with_cancel(
        graph: DependencyGraph,
        config: ExecutionConfig,
        cancel: CancelSignal,
    ) -> Self {
        let (core, completions) = SchedulingCore::new(graph, &config);
        Self {
            core,
            completions,
            cancel,
            deadline: None,
            config,
        }
    }

    /// Run until every node is terminal (or the run is aborted and drained).
    pub async fn run(mut self) -> Result<ExecutionReport> {
        info!(
            nodes = self.core.graph().len(),
            max_workers = self.config.max_workers.get(),
            policy = ?self.config.failure_policy,
            "execution started"
        );
        // A deadline past the end of the clock never fires.
        self.deadline = self
            .config
            .deadline
            .and_then(|d| Instant::now().checked_add(d));

        loop {
            if self.core.stop_reason().is_none() {
                if self.cancel.is_cancelled() {
                    self.core.stop(StopReason::Cancelled);
                } else if self.deadline.is_some_and(|at| Instant::now() >= at) {
                    self.core.stop(StopReason::DeadlineElapsed);
                }
            }

            if let Err(err) = self.core.run_pass() {
                return Err(self.abort(err).await);
            }

            if self.core.is_finished() {
                break;
            }

            match self.wait().await {
                Wake::Completion(Some(event)) => {
                    if let Err(err) = self.core.apply_completion(event) {
                        return Err(self.abort(err).await);
                    }
                    // Take everything else that has already arrived before the
                    // next pass.
                    while let Ok(event) = self.completions.try_recv() {
                        if let Err(err) = self.core.apply_completion(event) {
                            return Err(self.abort(err).await);
                        }
                    }
                }
                Wake::Completion(None) => {
                    let err = SchedulerError::Other(anyhow::anyhow!(
                        "completion channel closed with {} node(s) running",
                        self.core.running()
                    ));
                    return Err(self.abort(err).await);
                }
                Wake::Cancelled => {
                    info!("cancellation requested");
                    self.core.stop(StopReason::Cancelled);
                }
                Wake::DeadlineElapsed => {
                    info!("deadline elapsed");
                    self.core.stop(StopReason::DeadlineElapsed);
                }
            }
        }

        let report = self.core.into_report();
        info!(
            outcome = ?report.outcome,
            success = report.success,
            peak_workers = report.peak_workers,
            "execution finished"
        );
        Ok(report)
    }

    async fn wait(&mut self) -> Wake {
        let dispatching = self.core.stop_reason().is_none();
        let deadline = self.deadline;

        tokio::select! {
            biased;
            event = self.completions.recv() => Wake::Completion(event),
            _ = self.cancel.cancelled(), if dispatching => Wake::Cancelled,
            _ = wait_deadline(deadline), if dispatching && deadline.is_some() => Wake::DeadlineElapsed,
        }
    }

    /// Stop dispatch after a fatal error and wait for running work before
    /// returning the error. Further errors while draining are only logged.
    async fn abort(&mut self, err: SchedulerError) -> SchedulerError {
        error!(error = %err, running = self.core.running(), "fatal scheduler error; aborting run");
        self.core.stop(StopReason::Fatal);

        while self.core.running() > 0 {
            match self.completions.recv().await {
                Some(event) => {
                    if let Err(e) = self.core.apply_completion(event) {
                        error!(error = %e, "further error while draining");
                    }
                }
                None => break,
            }
        }
        debug!("in-flight work drained after fatal error");
        err
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

/// Execute `graph` to completion under `config`.
pub async fn execute(graph: DependencyGraph, config: ExecutionConfig) -> Result<ExecutionReport> {
    Coordinator::new(graph, config).run().await
}

/// Like [`execute`], stopping dispatch when `cancel` fires.
pub async fn execute_with_cancel(
    graph: DependencyGraph,
    config: ExecutionConfig,
    cancel: CancelSignal,
) -> Result<ExecutionReport> {
    Coordinator::with_cancel(graph, config, cancel).run().await
}

/// Blocking entry point: builds a multi-threaded runtime sized to the worker
/// count and runs [`execute`] on it.
pub fn execute_blocking(graph: DependencyGraph, config: ExecutionConfig) -> Result<ExecutionReport> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.max_workers.get())
        .enable_all()
        .build()?;
    runtime.block_on(execute(graph, config))
}
