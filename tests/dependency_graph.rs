// tests/dependency_graph.rs

mod common;
use crate::common::{id, node};

use workgraph::dag::GraphStep;
use workgraph::{DependencyGraph, NodeExecutionError, NodeState, SchedulerError};

fn failed() -> Result<(), NodeExecutionError> {
    Err(NodeExecutionError::Failed("boom".to_string()))
}

/// a -> b -> c, plus an independent d.
fn chain() -> DependencyGraph {
    DependencyGraph::build(vec![
        node("a"),
        node("b").after("a"),
        node("c").after("b"),
        node("d"),
    ])
    .unwrap()
}

#[test]
fn roots_start_ready_everything_else_pending() {
    let g = chain();
    assert_eq!(g.state_of("a"), Some(NodeState::Ready));
    assert_eq!(g.state_of("b"), Some(NodeState::Pending));
    assert_eq!(g.state_of("c"), Some(NodeState::Pending));
    assert_eq!(g.state_of("d"), Some(NodeState::Ready));
    assert_eq!(g.ready_nodes(), vec![id(&g, "a"), id(&g, "d")]);
    assert!(!g.is_finished());
}

#[test]
fn empty_graph_is_finished() {
    let g = DependencyGraph::build(Vec::new()).unwrap();
    assert!(g.is_empty());
    assert!(g.is_finished());
    assert!(g.ready_nodes().is_empty());
}

#[test]
fn two_node_cycle_is_rejected() {
    let err = DependencyGraph::build(vec![node("a").after("b"), node("b").after("a")])
        .unwrap_err();
    match err {
        SchedulerError::CycleDetected(msg) => {
            assert!(msg.contains("cycle detected"));
            assert!(msg.contains('a') || msg.contains('b'));
        }
        other => panic!("expected CycleDetected, got {other:?}"),
    }
}

#[test]
fn longer_cycle_behind_a_valid_prefix_is_rejected() {
    let err = DependencyGraph::build(vec![
        node("root"),
        node("x").after("root").after("z"),
        node("y").after("x"),
        node("z").after("y"),
    ])
    .unwrap_err();
    assert!(matches!(err, SchedulerError::CycleDetected(_)), "{err:?}");
}

#[test]
fn self_dependency_is_a_cycle() {
    let err = DependencyGraph::build(vec![node("a").after("a")]).unwrap_err();
    assert!(matches!(err, SchedulerError::CycleDetected(_)), "{err:?}");
}

#[test]
fn duplicate_id_is_rejected() {
    let err = DependencyGraph::build(vec![node("a"), node("a")]).unwrap_err();
    assert!(matches!(err, SchedulerError::DuplicateNode(ref n) if n == "a"), "{err:?}");
}

#[test]
fn unknown_dependency_is_rejected() {
    let err = DependencyGraph::build(vec![node("a").after("ghost")]).unwrap_err();
    match err {
        SchedulerError::UnknownDependency { node, dependency } => {
            assert_eq!(node, "a");
            assert_eq!(dependency, "ghost");
        }
        other => panic!("expected UnknownDependency, got {other:?}"),
    }
}

#[test]
fn repeated_dependency_counts_once() {
    let mut g = DependencyGraph::build(vec![node("a"), node("b").after("a").after("a")]).unwrap();
    let (a, b) = (id(&g, "a"), id(&g, "b"));
    assert_eq!(g.dependencies_of(b), &[a]);

    g.mark_running(a).unwrap();
    let step = g.mark_completed(a, Ok(())).unwrap();
    assert_eq!(step.newly_ready, vec![b]);
    assert_eq!(g.state_of("b"), Some(NodeState::Ready));
}

#[test]
fn repeated_resource_keys_merge_and_exclusive_wins() {
    let g = DependencyGraph::build(vec![node("a").shared("r").exclusive("r").shared("s")]).unwrap();
    let reqs = g.node(id(&g, "a")).requirements();
    assert_eq!(reqs.len(), 2);
    assert_eq!(reqs[0].key, "r");
    assert_eq!(reqs[0].mode, workgraph::AccessMode::Exclusive);
    assert_eq!(reqs[1].key, "s");
    assert_eq!(reqs[1].mode, workgraph::AccessMode::Shared);
}

#[test]
fn dependents_become_ready_only_when_all_dependencies_resolve() {
    let mut g = DependencyGraph::build(vec![
        node("a"),
        node("b"),
        node("join").after("a").after("b"),
    ])
    .unwrap();
    let (a, b, join) = (id(&g, "a"), id(&g, "b"), id(&g, "join"));
    assert_eq!(g.dependents_of(a), &[join]);

    g.mark_running(a).unwrap();
    g.mark_running(b).unwrap();
    assert_eq!(g.running_count(), 2);

    let step = g.mark_completed(a, Ok(())).unwrap();
    assert_eq!(step, GraphStep::default());
    assert_eq!(g.state_of("join"), Some(NodeState::Pending));

    let step = g.mark_completed(b, Ok(())).unwrap();
    assert_eq!(step.newly_ready, vec![join]);
    assert_eq!(g.ready_nodes(), vec![join]);
}

#[test]
fn failure_skips_transitive_dependents_only() {
    let mut g = chain();
    let (a, b, c, d) = (id(&g, "a"), id(&g, "b"), id(&g, "c"), id(&g, "d"));

    g.mark_running(a).unwrap();
    let step = g.mark_completed(a, failed()).unwrap();

    assert!(step.newly_ready.is_empty());
    assert_eq!(step.newly_skipped, vec![b, c]);
    assert_eq!(g.state_of("a"), Some(NodeState::Failed));
    assert_eq!(g.state_of("b"), Some(NodeState::Skipped));
    assert_eq!(g.state_of("c"), Some(NodeState::Skipped));
    // Not downstream of `a`: left alone by the graph itself.
    assert_eq!(g.node(d).state(), NodeState::Ready);
    assert_eq!(
        g.node(a).failure(),
        Some(&NodeExecutionError::Failed("boom".to_string()))
    );
}

#[test]
fn diamond_skip_visits_each_node_once() {
    let mut g = DependencyGraph::build(vec![
        node("top"),
        node("left").after("top"),
        node("right").after("top"),
        node("bottom").after("left").after("right"),
    ])
    .unwrap();
    let top = id(&g, "top");
    g.mark_running(top).unwrap();
    let step = g.mark_completed(top, failed()).unwrap();
    assert_eq!(step.newly_skipped.len(), 3);
    assert!(g.is_finished());
}

#[test]
fn failed_dependency_never_resolves_a_join() {
    let mut g = DependencyGraph::build(vec![
        node("ok"),
        node("bad"),
        node("join").after("ok").after("bad"),
    ])
    .unwrap();
    let (ok, bad, join) = (id(&g, "ok"), id(&g, "bad"), id(&g, "join"));
    g.mark_running(ok).unwrap();
    g.mark_running(bad).unwrap();

    let step = g.mark_completed(bad, failed()).unwrap();
    assert_eq!(step.newly_skipped, vec![join]);

    // The other dependency finishing later must not revive the join.
    let step = g.mark_completed(ok, Ok(())).unwrap();
    assert_eq!(step, GraphStep::default());
    assert_eq!(g.state_of("join"), Some(NodeState::Skipped));
    assert!(g.ready_nodes().is_empty());
    assert!(g.is_finished());
}

#[test]
fn skip_unstarted_leaves_running_and_terminal_nodes() {
    let mut g = chain();
    let (a, d) = (id(&g, "a"), id(&g, "d"));
    g.mark_running(d).unwrap();
    g.mark_completed(d, Ok(())).unwrap();
    g.mark_running(a).unwrap();

    let skipped = g.skip_unstarted();
    assert_eq!(skipped, vec![id(&g, "b"), id(&g, "c")]);
    assert_eq!(g.state_of("a"), Some(NodeState::Running));
    assert_eq!(g.state_of("d"), Some(NodeState::Completed));
    assert_eq!(g.unfinished(), vec!["a".to_string()]);

    g.mark_completed(a, Ok(())).unwrap();
    assert!(g.is_finished());
}

#[test]
fn illegal_transitions_are_rejected() {
    let mut g = chain();
    let (a, b) = (id(&g, "a"), id(&g, "b"));

    // Pending cannot start.
    let err = g.mark_running(b).unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidState { .. }), "{err:?}");

    // Ready cannot complete.
    let err = g.mark_completed(a, Ok(())).unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidState { .. }), "{err:?}");

    // Terminal cannot start again.
    g.mark_running(a).unwrap();
    g.mark_completed(a, Ok(())).unwrap();
    let err = g.mark_running(a).unwrap_err();
    match err {
        SchedulerError::InvalidState { node, expected, found } => {
            assert_eq!(node, "a");
            assert_eq!(expected, "ready");
            assert_eq!(found, "completed");
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }
}

#[test]
fn ready_nodes_follow_declaration_order() {
    let g = DependencyGraph::build(vec![node("z"), node("m"), node("a")]).unwrap();
    let names: Vec<&str> = g.ready_nodes().into_iter().map(|n| g.name_of(n)).collect();
    assert_eq!(names, vec!["z", "m", "a"]);
}
