// tests/coordinator.rs

mod common;
use crate::common::{ExecutionLog, RecordingGraph, WorkSpec, config, init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use workgraph::types::FailurePolicy;
use workgraph::{
    DependencyGraph, NodeExecutionError, NodeState, RunOutcome, cancel_pair, execute,
    execute_blocking, execute_with_cancel,
};

type TestResult = Result<(), Box<dyn Error>>;

/// Poll the log until `node` has started.
async fn wait_started(log: &ExecutionLog, node: &str) {
    with_timeout(async {
        while !log.started().iter().any(|n| n == node) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

#[tokio::test]
async fn chain_runs_in_dependency_order() -> TestResult {
    init_tracing();
    let (graph, log) = RecordingGraph::new()
        .simple("A", &[])
        .simple("B", &["A"])
        .simple("C", &["B"])
        .build();

    let report = with_timeout(execute(graph, config(1, FailurePolicy::FailFast))).await?;

    assert_eq!(report.outcome, RunOutcome::AllDone);
    assert!(report.success);
    assert_eq!(report.dispatch_order, vec!["A", "B", "C"]);
    assert_eq!(log.started(), vec!["A", "B", "C"]);
    assert!(log.finished_before_start("A", "B"));
    assert!(log.finished_before_start("B", "C"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exclusive_lock_holders_never_overlap() -> TestResult {
    init_tracing();
    let (graph, log) = RecordingGraph::new()
        .node(WorkSpec::new("X").exclusive("R").delay_ms(30))
        .node(WorkSpec::new("Y").exclusive("R").delay_ms(30))
        .build();

    let report = with_timeout(execute(graph, config(2, FailurePolicy::FailFast))).await?;

    assert!(report.success);
    assert!(!log.ran_concurrently("X", "Y"));
    assert!(log.conflicts().is_empty(), "{:?}", log.conflicts());
    assert_eq!(log.peak_concurrency(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn node_waits_for_lock_held_by_running_node() -> TestResult {
    init_tracing();
    let gate = Arc::new(Notify::new());
    let (graph, log) = RecordingGraph::new()
        .node(WorkSpec::new("E").exclusive("R").gated(Arc::clone(&gate)))
        .node(WorkSpec::new("D").exclusive("R"))
        .build();

    let run = tokio::spawn(execute(graph, config(2, FailurePolicy::FailFast)));

    wait_started(&log, "E").await;
    // A free lease is not enough while E holds R.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(log.started(), vec!["E"]);

    gate.notify_one();
    let report = with_timeout(run).await??;

    assert!(report.success);
    assert_eq!(report.dispatch_order, vec!["E", "D"]);
    assert!(log.finished_before_start("E", "D"));
    Ok(())
}

#[tokio::test]
async fn single_lease_dispatches_in_declaration_order() -> TestResult {
    init_tracing();
    let (graph, log) = RecordingGraph::new()
        .node(WorkSpec::new("P").delay_ms(20))
        .node(WorkSpec::new("Q"))
        .build();

    let report = with_timeout(execute(graph, config(1, FailurePolicy::FailFast))).await?;

    assert!(report.success);
    assert_eq!(report.dispatch_order, vec!["P", "Q"]);
    assert!(log.finished_before_start("P", "Q"));
    assert_eq!(report.peak_workers, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shared_lock_holders_may_overlap() -> TestResult {
    init_tracing();
    let (graph, log) = RecordingGraph::new()
        .node(WorkSpec::new("r1").shared("cache").delay_ms(50))
        .node(WorkSpec::new("r2").shared("cache").delay_ms(50))
        .node(WorkSpec::new("w").exclusive("cache"))
        .build();

    let report = with_timeout(execute(graph, config(3, FailurePolicy::FailFast))).await?;

    assert!(report.success);
    assert!(log.ran_concurrently("r1", "r2"));
    assert!(log.finished_before_start("r1", "w"));
    assert!(log.finished_before_start("r2", "w"));
    assert!(log.conflicts().is_empty(), "{:?}", log.conflicts());
    Ok(())
}

#[tokio::test]
async fn fail_fast_skips_dependents_and_unstarted_nodes() -> TestResult {
    init_tracing();
    let (graph, log) = RecordingGraph::new()
        .node(WorkSpec::new("bad").failing())
        .simple("child", &["bad"])
        .simple("other", &[])
        .build();

    let report = with_timeout(execute(graph, config(1, FailurePolicy::FailFast))).await?;

    assert_eq!(report.outcome, RunOutcome::AllDone);
    assert!(!report.success);
    assert_eq!(report.state_of("bad"), Some(NodeState::Failed));
    assert_eq!(report.state_of("child"), Some(NodeState::Skipped));
    assert_eq!(report.state_of("other"), Some(NodeState::Skipped));
    assert_eq!(log.started(), vec!["bad"]);

    let failure = report.node("bad").and_then(|n| n.failure.clone());
    assert!(matches!(failure, Some(NodeExecutionError::Failed(ref m)) if m.contains("on purpose")));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fail_fast_lets_running_nodes_finish() -> TestResult {
    init_tracing();
    let (graph, log) = RecordingGraph::new()
        .node(WorkSpec::new("slow").delay_ms(80))
        .node(WorkSpec::new("bad").failing())
        .simple("after_slow", &["slow"])
        .build();

    let report = with_timeout(execute(graph, config(2, FailurePolicy::FailFast))).await?;

    assert_eq!(report.state_of("slow"), Some(NodeState::Completed));
    assert_eq!(report.state_of("bad"), Some(NodeState::Failed));
    assert_eq!(report.state_of("after_slow"), Some(NodeState::Skipped));
    assert_eq!(log.finished(), vec!["bad", "slow"]);
    Ok(())
}

#[tokio::test]
async fn continue_skips_dependents_but_runs_independent_branches() -> TestResult {
    init_tracing();
    let (graph, log) = RecordingGraph::new()
        .node(WorkSpec::new("compile").failing())
        .simple("link", &["compile"])
        .simple("package", &["link"])
        .simple("docs", &[])
        .simple("publish_docs", &["docs"])
        .build();

    let report = with_timeout(execute(graph, config(1, FailurePolicy::Continue))).await?;

    assert_eq!(report.outcome, RunOutcome::AllDone);
    assert!(!report.success);
    assert_eq!(report.state_of("compile"), Some(NodeState::Failed));
    assert_eq!(report.state_of("link"), Some(NodeState::Skipped));
    assert_eq!(report.state_of("package"), Some(NodeState::Skipped));
    assert_eq!(report.state_of("docs"), Some(NodeState::Completed));
    assert_eq!(report.state_of("publish_docs"), Some(NodeState::Completed));
    assert_eq!(report.failed().count(), 1);
    assert_eq!(log.started(), vec!["compile", "docs", "publish_docs"]);
    Ok(())
}

#[tokio::test]
async fn panicking_work_is_recorded_as_failure() -> TestResult {
    init_tracing();
    let (graph, _log) = RecordingGraph::new()
        .node(WorkSpec::new("boom").panicking())
        .simple("next", &["boom"])
        .build();

    let report = with_timeout(execute(graph, config(2, FailurePolicy::Continue))).await?;

    let boom = report.node("boom").expect("boom in report");
    assert_eq!(boom.state, NodeState::Failed);
    assert!(matches!(boom.failure, Some(NodeExecutionError::Panicked(ref m)) if m.contains("boom")));
    assert_eq!(report.state_of("next"), Some(NodeState::Skipped));
    assert_eq!(report.dispatch_order, vec!["boom"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_stops_dispatch_and_drains() -> TestResult {
    init_tracing();
    let gate = Arc::new(Notify::new());
    let (graph, log) = RecordingGraph::new()
        .node(WorkSpec::new("hold").gated(Arc::clone(&gate)))
        .simple("later", &["hold"])
        .build();

    let (cancel, signal) = cancel_pair();
    let run = tokio::spawn(execute_with_cancel(
        graph,
        config(2, FailurePolicy::FailFast),
        signal,
    ));

    wait_started(&log, "hold").await;
    cancel.cancel();
    assert!(cancel.is_cancelled());
    gate.notify_one();

    let report = with_timeout(run).await??;

    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert!(!report.success);
    assert_eq!(report.state_of("hold"), Some(NodeState::Completed));
    assert_eq!(report.state_of("later"), Some(NodeState::Skipped));
    assert_eq!(log.started(), vec!["hold"]);
    Ok(())
}

#[tokio::test]
async fn cancelled_before_start_runs_nothing() -> TestResult {
    init_tracing();
    let (graph, log) = RecordingGraph::new().simple("a", &[]).simple("b", &[]).build();

    let (cancel, signal) = cancel_pair();
    cancel.cancel();
    let report =
        with_timeout(execute_with_cancel(graph, config(2, FailurePolicy::FailFast), signal))
            .await?;

    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert_eq!(report.count(NodeState::Skipped), 2);
    assert!(log.started().is_empty());
    assert!(report.dispatch_order.is_empty());
    Ok(())
}

#[tokio::test]
async fn deadline_aborts_after_running_work_drains() -> TestResult {
    init_tracing();
    let (graph, _log) = RecordingGraph::new()
        .node(WorkSpec::new("slow").delay_ms(200))
        .simple("after", &["slow"])
        .build();

    let cfg = config(1, FailurePolicy::FailFast).with_deadline(Duration::from_millis(30));
    let report = with_timeout(execute(graph, cfg)).await?;

    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert_eq!(report.state_of("slow"), Some(NodeState::Completed));
    assert_eq!(report.state_of("after"), Some(NodeState::Skipped));
    Ok(())
}

#[tokio::test]
async fn empty_graph_finishes_immediately() -> TestResult {
    init_tracing();
    let graph = DependencyGraph::build(Vec::new())?;
    let report = with_timeout(execute(graph, config(1, FailurePolicy::FailFast))).await?;
    assert_eq!(report.outcome, RunOutcome::AllDone);
    assert!(report.success);
    assert!(report.nodes.is_empty());
    assert_eq!(report.peak_workers, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wide_graph_respects_worker_bound() -> TestResult {
    init_tracing();
    let mut nodes = RecordingGraph::new();
    for i in 0..12 {
        nodes = nodes.node(WorkSpec::new(&format!("n{i}")).delay_ms(10));
    }
    let (graph, log) = nodes.build();

    let report = with_timeout(execute(graph, config(3, FailurePolicy::FailFast))).await?;

    assert!(report.success);
    assert!(report.peak_workers <= 3);
    assert!(log.peak_concurrency() <= 3);
    assert_eq!(log.finished().len(), 12);
    Ok(())
}

#[tokio::test]
async fn report_renders_every_node() -> TestResult {
    let (graph, _log) = RecordingGraph::new()
        .simple("one", &[])
        .node(WorkSpec::new("two").failing())
        .build();
    let report = execute(graph, config(1, FailurePolicy::Continue)).await?;

    let text = report.render();
    assert!(text.contains("one"));
    assert!(text.contains("two"));
    assert!(text.contains("failed"));
    assert!(text.contains("1 completed, 1 failed, 0 skipped"));
    Ok(())
}

#[test]
fn blocking_entry_point_runs_to_completion() -> TestResult {
    let (graph, log) = RecordingGraph::new()
        .simple("a", &[])
        .simple("b", &["a"])
        .build();

    let report = execute_blocking(graph, config(2, FailurePolicy::FailFast))?;

    assert!(report.success);
    assert_eq!(log.started(), vec!["a", "b"]);
    Ok(())
}
