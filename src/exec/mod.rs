// src/exec/mod.rs

//! Work execution layer.
//!
//! - [`work`] defines the [`WorkItem`] trait nodes carry, plus closure-backed
//!   work.
//! - [`command`] provides [`ShellCommand`], the work item used by the
//!   `workgraph` binary.
//! - [`worker`] holds [`NodeExecutionWorker`], the admission point that turns
//!   a ready node into a running task when a worker lease (and any required
//!   resource lock) is available.

pub mod command;
pub mod work;
pub mod worker;

pub use command::ShellCommand;
pub use work::{FnWork, WorkContext, WorkFuture, WorkItem, work_fn};
pub use worker::{CompletionEvent, NodeExecutionWorker, NodeSchedulingResult};
