// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod lease;
pub mod locks;
pub mod logging;
pub mod types;

use std::num::NonZeroUsize;

use anyhow::{Result, anyhow, bail};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::types::FailurePolicy;

pub use crate::dag::{DependencyGraph, NodeDescriptor, NodeId, NodeState, ResourceRequirement};
pub use crate::engine::{
    CancelHandle, CancelSignal, Coordinator, ExecutionConfig, ExecutionReport, NodeReport,
    RunOutcome, cancel_pair, execute, execute_blocking, execute_with_cancel,
};
pub use crate::errors::{NodeExecutionError, SchedulerError};
pub use crate::exec::{NodeSchedulingResult, WorkContext, WorkItem};
pub use crate::types::AccessMode;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - graph file loading and validation
/// - CLI overrides of the execution settings
/// - Ctrl-C → cooperative cancellation
/// - the coordinator, and printing its report
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let mut exec_cfg = cfg.execution_config()?;
    if let Some(n) = args.max_workers {
        exec_cfg.max_workers = NonZeroUsize::new(n as usize)
            .ok_or_else(|| anyhow!("--max-workers must be >= 1"))?;
    }
    if args.continue_on_failure {
        exec_cfg.failure_policy = FailurePolicy::Continue;
    }

    let graph = cfg.build_graph()?;

    // Ctrl-C → stop dispatching, let running commands finish.
    let (cancel, signal) = cancel_pair();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("failed to listen for Ctrl+C: {e}");
            return;
        }
        info!("Ctrl+C received; cancelling run");
        cancel.cancel();
    });

    let report = execute_with_cancel(graph, exec_cfg, signal).await?;
    print!("{}", report.render());

    if !report.success {
        bail!(
            "run did not succeed ({:?}: {} failed, {} skipped)",
            report.outcome,
            report.count(NodeState::Failed),
            report.count(NodeState::Skipped)
        );
    }
    Ok(())
}

/// Simple dry-run output: print settings and nodes.
fn print_dry_run(cfg: &ConfigFile) {
    println!("workgraph dry-run");
    match cfg.config.max_workers {
        Some(n) => println!("  config.max_workers = {n}"),
        None => println!("  config.max_workers = <host parallelism>"),
    }
    println!("  config.failure_policy = {:?}", cfg.config.failure_policy);
    if let Some(ref deadline) = cfg.config.deadline {
        println!("  config.deadline = {deadline}");
    }
    println!();

    println!("nodes ({}):", cfg.node.len());
    for node in &cfg.node {
        println!("  - {}", node.id);
        println!("      cmd: {}", node.cmd);
        if !node.after.is_empty() {
            println!("      after: {:?}", node.after);
        }
        if !node.exclusive.is_empty() {
            println!("      exclusive: {:?}", node.exclusive);
        }
        if !node.shared.is_empty() {
            println!("      shared: {:?}", node.shared);
        }
    }

    debug!("dry-run complete (no execution)");
}
