// src/engine/mod.rs

//! Execution engine.
//!
//! - [`core`] is the synchronous scheduling core: graph, lock registry and
//!   lease pool for one session, scheduling passes and completion handling.
//! - [`runtime`] is the async coordinator loop around the core and the
//!   `execute*` entry points.
//! - [`cancel`] provides cooperative cancellation.
//! - [`report`] defines the per-session [`ExecutionReport`].

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::lease::host_parallelism;
use crate::types::FailurePolicy;

/// Settings for one execution session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Size of the worker lease pool.
    pub max_workers: NonZeroUsize,
    pub failure_policy: FailurePolicy,
    /// Stop dispatching new nodes once this much time has passed.
    pub deadline: Option<Duration>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_workers: host_parallelism(),
            failure_policy: FailurePolicy::default(),
            deadline: None,
        }
    }
}

impl ExecutionConfig {
    pub fn with_max_workers(mut self, max_workers: NonZeroUsize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

pub mod cancel;
pub mod core;
pub mod report;
pub mod runtime;

pub use self::cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use self::core::{PassSummary, SchedulingCore, StopReason};
pub use self::report::{ExecutionReport, NodeReport, RunOutcome};
pub use self::runtime::{Coordinator, execute, execute_blocking, execute_with_cancel};
