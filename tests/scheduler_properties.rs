use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use proptest::prelude::*;

use phasedag::dag::{TaskGraph, TaskId, TaskState};
use phasedag::engine::{RunReport, Runtime, RuntimeOptions};
use phasedag::exec::{ExecutorRegistry, TaskContext};
use phasedag::types::Phase;
use phasedag_test_utils::{task, RecordingExecutor};

const PHASES: [Phase; 4] = [Phase::Setup, Phase::Main, Phase::Export, Phase::Cleanup];

#[derive(Debug, Clone)]
struct Plan {
    phases: Vec<Phase>,
    deps: Vec<BTreeSet<usize>>,
    failing: HashSet<usize>,
    workers: usize,
}

fn name(i: usize) -> String {
    format!("task_{i}")
}

// Acyclic by construction: task N may only depend on tasks 0..N-1 in the
// same or an earlier phase.
fn plan_strategy(max_tasks: usize) -> impl Strategy<Value = Plan> {
    (1..=max_tasks).prop_flat_map(|n| {
        (
            proptest::collection::vec(0..PHASES.len(), n),
            proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..3), n),
            proptest::collection::hash_set(0..n, 0..=n / 2),
            1..4usize,
        )
            .prop_map(move |(phase_idx, raw_deps, failing, workers)| {
                let phases: Vec<Phase> = phase_idx.iter().map(|&p| PHASES[p]).collect();
                let deps = raw_deps
                    .into_iter()
                    .enumerate()
                    .map(|(i, candidates)| {
                        candidates
                            .into_iter()
                            .filter(|_| i > 0)
                            .map(|c| c % i.max(1))
                            .filter(|&d| phases[d] <= phases[i])
                            .collect()
                    })
                    .collect();
                Plan {
                    phases,
                    deps,
                    failing,
                    workers,
                }
            })
    })
}

fn build(plan: &Plan) -> TaskGraph {
    let mut builder = TaskGraph::builder();
    for (i, phase) in plan.phases.iter().enumerate() {
        let blockers: Vec<String> = plan.deps[i].iter().map(|&d| name(d)).collect();
        let blockers: Vec<&str> = blockers.iter().map(String::as_str).collect();
        builder.add(task(&name(i), *phase, &blockers));
    }
    builder.build().expect("generated graph is valid")
}

fn run(plan: &Plan, graph: &TaskGraph, executor: &RecordingExecutor) -> RunReport {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");
    let registry = Arc::new(ExecutorRegistry::new().with_executor(executor.clone()));
    let runtime = Runtime::new(
        graph,
        registry,
        TaskContext::default(),
        RuntimeOptions::with_workers(plan.workers),
    );

    rt.block_on(async {
        let result = tokio::time::timeout(std::time::Duration::from_secs(10), runtime.run())
            .await
            .expect("run terminates");
        match result {
            Ok(report) => report,
            Err(err) => err.report().cloned().expect("failed run carries a report"),
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn runs_terminate_and_respect_blockers(plan in plan_strategy(10)) {
        let graph = build(&plan);
        let mut executor = RecordingExecutor::new();
        for &i in &plan.failing {
            executor = executor.failing(&name(i));
        }

        let report = run(&plan, &graph, &executor);
        let states: HashMap<TaskId, TaskState> =
            report.tasks.iter().map(|r| (r.id.clone(), r.state)).collect();

        // Every task of a phase that started is terminal; CLEANUP always starts.
        for pg in graph.phases() {
            let started = pg.tasks().any(|id| states[id] != TaskState::Pending)
                || pg.phase().is_cleanup();
            if started {
                for id in pg.tasks() {
                    prop_assert!(states[id].is_terminal(), "{id} left {:?}", states[id]);
                }
            }
        }

        for record in executor.executions() {
            let reference = graph.task(&record.task).expect("executed task exists");
            prop_assert_eq!(executor.count(record.task.as_str()), 1);
            for blocker in reference.blockers() {
                // Blockers succeeded before the dependent started.
                prop_assert_eq!(states[blocker], TaskState::Succeeded);
                let blocker_run = executor.record(blocker.as_str()).expect("blocker ran");
                prop_assert!(blocker_run.finished <= record.started);
            }
        }

        let any_main_failure = report.tasks.iter().any(|r| {
            !r.phase.is_cleanup() && r.state == TaskState::Failed
        });
        prop_assert_eq!(report.is_success(), !any_main_failure);
    }
}
