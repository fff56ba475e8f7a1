use std::error::Error;

use phasedag::dag::{TaskGraph, TaskId, TaskKind};
use phasedag::errors::PhasedagError;
use phasedag::types::Phase;
use phasedag_test_utils::{diamond, init_tracing, task};

type TestResult = Result<(), Box<dyn Error>>;

fn position(order: &[&TaskId], id: &str) -> usize {
    order
        .iter()
        .position(|t| t.as_str() == id)
        .unwrap_or_else(|| panic!("task {id} missing from order"))
}

#[test]
fn diamond_is_ordered_topologically() {
    init_tracing();

    let graph = diamond(Phase::Main);
    let pg = graph.phase(Phase::Main).expect("main phase present");
    let order: Vec<&TaskId> = pg.tasks().collect();

    assert_eq!(order.len(), 4);
    assert!(position(&order, "a") < position(&order, "b"));
    assert!(position(&order, "a") < position(&order, "c"));
    assert!(position(&order, "b") < position(&order, "d"));
    assert!(position(&order, "c") < position(&order, "d"));

    let mut dependents: Vec<&str> = graph
        .dependents_of(&TaskId::from("a"))
        .iter()
        .map(|t| t.as_str())
        .collect();
    dependents.sort();
    assert_eq!(dependents, vec!["b", "c"]);
    assert_eq!(graph.blockers_of(&TaskId::from("d")).len(), 2);
}

#[test]
fn phases_are_iterated_in_barrier_order() -> TestResult {
    init_tracing();

    let graph = TaskGraph::builder()
        .with_task(task("clean", Phase::Cleanup, &[]))
        .with_task(task("load", Phase::Main, &["init"]))
        .with_task(task("init", Phase::Setup, &[]))
        .build()?;

    let phases: Vec<Phase> = graph.phases().map(|pg| pg.phase()).collect();
    assert_eq!(phases, vec![Phase::Setup, Phase::Main, Phase::Cleanup]);
    assert_eq!(graph.len(), 3);
    assert!(graph.phase(Phase::Export).is_none());
    assert!(graph.tasks_in(Phase::Export).is_empty());

    // Cross-phase blockers are kept but not part of the phase's own edges.
    let main = graph.phase(Phase::Main).expect("main phase present");
    let load = TaskId::from("load");
    assert!(main.dependencies_of(&load).is_empty());
    assert_eq!(main.external_dependencies_of(&load), &[TaskId::from("init")]);
    assert_eq!(graph.task(&load).map(|t| t.kind()), Some(TaskKind::Command));
    Ok(())
}

#[test]
fn duplicate_ids_are_rejected() {
    let err = TaskGraph::builder()
        .with_task(task("a", Phase::Main, &[]))
        .with_task(task("a", Phase::Export, &[]))
        .build()
        .unwrap_err();
    assert!(matches!(err, PhasedagError::DuplicateTask(id) if id.as_str() == "a"));
}

#[test]
fn dangling_blockers_are_rejected() {
    let err = TaskGraph::builder()
        .with_task(task("a", Phase::Main, &["ghost"]))
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        PhasedagError::UnknownBlocker { task, blocker }
            if task.as_str() == "a" && blocker.as_str() == "ghost"
    ));
}

#[test]
fn self_blockers_are_rejected() {
    let err = TaskGraph::builder()
        .with_task(task("a", Phase::Main, &["a"]))
        .build()
        .unwrap_err();
    assert!(matches!(err, PhasedagError::SelfBlocker(_)));
}

#[test]
fn blockers_in_later_phases_are_rejected() {
    let err = TaskGraph::builder()
        .with_task(task("early", Phase::Setup, &["late"]))
        .with_task(task("late", Phase::Main, &[]))
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        PhasedagError::BlockerInLaterPhase {
            phase: Phase::Setup,
            blocker_phase: Phase::Main,
            ..
        }
    ));
}

#[test]
fn same_phase_cycles_are_rejected() {
    init_tracing();

    let err = TaskGraph::builder()
        .with_task(task("a", Phase::Main, &["c"]))
        .with_task(task("b", Phase::Main, &["a"]))
        .with_task(task("c", Phase::Main, &["b"]))
        .with_task(task("free", Phase::Main, &[]))
        .build()
        .unwrap_err();

    match err {
        PhasedagError::DagCycle { phase, task } => {
            assert_eq!(phase, Phase::Main);
            assert!(["a", "b", "c"].contains(&task.as_str()));
        }
        other => panic!("expected DagCycle, got {other:?}"),
    }
}

#[test]
fn empty_graph_builds() -> TestResult {
    let graph = TaskGraph::builder().build()?;
    assert!(graph.is_empty());
    assert_eq!(graph.phases().count(), 0);
    Ok(())
}
