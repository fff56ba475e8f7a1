use std::error::Error;
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

use phasedag::dag::{TaskGraph, TaskId, TaskKind, TaskReference, TaskState};
use phasedag::engine::{CancelHandle, RunStatus, Runtime, RuntimeOptions};
use phasedag::broker::{ResourceBroker, Scope};
use phasedag::errors::{ExecutionError, PhasedagError};
use phasedag::exec::{ExecFuture, ExecutorRegistry, TaskContext, TaskExecutor};
use phasedag::types::Phase;
use phasedag_test_utils::{diamond, init_tracing, task, with_timeout, RecordingExecutor};

type TestResult = Result<(), Box<dyn Error>>;

fn registry(executor: &RecordingExecutor) -> Arc<ExecutorRegistry> {
    Arc::new(ExecutorRegistry::new().with_executor(executor.clone()))
}

fn id(s: &str) -> TaskId {
    TaskId::from(s)
}

#[tokio::test]
async fn diamond_runs_in_dependency_order() -> TestResult {
    init_tracing();

    let graph = diamond(Phase::Main);
    let executor = RecordingExecutor::new().with_default_delay(Duration::from_millis(20));
    let runtime = Runtime::new(
        &graph,
        registry(&executor),
        TaskContext::default(),
        RuntimeOptions::with_workers(4),
    );

    let report = with_timeout(runtime.run()).await?;
    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(report.count(TaskState::Succeeded), 4);

    let a = executor.record("a").unwrap();
    let b = executor.record("b").unwrap();
    let c = executor.record("c").unwrap();
    let d = executor.record("d").unwrap();
    assert!(b.started >= a.finished);
    assert!(c.started >= a.finished);
    assert!(d.started >= b.finished);
    assert!(d.started >= c.finished);
    // b and c are independent and were given two workers.
    assert_eq!(executor.max_concurrency(), 2);
    Ok(())
}

#[tokio::test]
async fn failed_blocker_skips_dependent_while_sibling_completes() -> TestResult {
    init_tracing();

    let graph = diamond(Phase::Main);
    let executor = RecordingExecutor::new()
        .failing("b")
        .with_delay("c", Duration::from_millis(30));
    let runtime = Runtime::new(
        &graph,
        registry(&executor),
        TaskContext::default(),
        RuntimeOptions::with_workers(4),
    );

    let err = with_timeout(runtime.run()).await.unwrap_err();
    let PhasedagError::RunFailed {
        task,
        phase,
        kind,
        source,
        report,
    } = err
    else {
        panic!("expected RunFailed");
    };

    assert_eq!(task, id("b"));
    assert_eq!(phase, Phase::Main);
    assert_eq!(kind, TaskKind::Command);
    assert!(matches!(*source, PhasedagError::Execution { .. }));
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.state_of(&id("c")), Some(TaskState::Succeeded));
    assert_eq!(report.state_of(&id("d")), Some(TaskState::Skipped));
    assert!(report.record(&id("b")).unwrap().error.is_some());
    assert_eq!(executor.count("d"), 0);
    Ok(())
}

#[tokio::test]
async fn cleanup_runs_exactly_once_after_failure() -> TestResult {
    init_tracing();

    let graph = TaskGraph::builder()
        .with_task(task("work", Phase::Main, &[]))
        .with_task(task("publish", Phase::Export, &["work"]))
        .with_task(task("tidy", Phase::Cleanup, &[]))
        .build()?;
    let executor = RecordingExecutor::new().failing("work");
    let runtime = Runtime::new(
        &graph,
        registry(&executor),
        TaskContext::default(),
        RuntimeOptions::with_workers(2),
    );

    let err = with_timeout(runtime.run()).await.unwrap_err();
    let report = err.report().expect("failed run carries a report");

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(executor.count("tidy"), 1);
    assert_eq!(report.state_of(&id("tidy")), Some(TaskState::Succeeded));
    // The EXPORT phase was never started.
    assert_eq!(executor.count("publish"), 0);
    assert_eq!(report.state_of(&id("publish")), Some(TaskState::Pending));
    Ok(())
}

#[tokio::test]
async fn cleanup_failure_is_a_warning_only() -> TestResult {
    init_tracing();

    let graph = TaskGraph::builder()
        .with_task(task("work", Phase::Main, &[]))
        .with_task(task("tidy", Phase::Cleanup, &[]))
        .build()?;
    let executor = RecordingExecutor::new().failing("tidy");
    let runtime = Runtime::new(
        &graph,
        registry(&executor),
        TaskContext::default(),
        RuntimeOptions::with_workers(2),
    );

    let report = with_timeout(runtime.run()).await?;
    assert!(report.is_success());
    assert_eq!(report.cleanup_warnings.len(), 1);
    assert!(report.cleanup_warnings[0].contains("tidy"));
    assert_eq!(report.state_of(&id("tidy")), Some(TaskState::Failed));
    Ok(())
}

#[tokio::test]
async fn phases_are_full_barriers() -> TestResult {
    init_tracing();

    let graph = TaskGraph::builder()
        .with_task(task("setup-slow", Phase::Setup, &[]))
        .with_task(task("setup-fast", Phase::Setup, &[]))
        .with_task(task("main-1", Phase::Main, &[]))
        .with_task(task("main-2", Phase::Main, &[]))
        .build()?;
    let executor = RecordingExecutor::new().with_delay("setup-slow", Duration::from_millis(50));
    let runtime = Runtime::new(
        &graph,
        registry(&executor),
        TaskContext::default(),
        RuntimeOptions::with_workers(4),
    );

    with_timeout(runtime.run()).await?;

    let setup_done = executor.record("setup-slow").unwrap().finished;
    for main in ["main-1", "main-2"] {
        assert!(executor.record(main).unwrap().started >= setup_done);
    }
    Ok(())
}

#[tokio::test]
async fn single_worker_runs_one_task_at_a_time() -> TestResult {
    init_tracing();

    let graph = TaskGraph::builder()
        .with_task(task("x", Phase::Main, &[]))
        .with_task(task("y", Phase::Main, &[]))
        .with_task(task("z", Phase::Main, &[]))
        .build()?;
    let executor = RecordingExecutor::new().with_default_delay(Duration::from_millis(10));
    let runtime = Runtime::new(
        &graph,
        registry(&executor),
        TaskContext::default(),
        RuntimeOptions::with_workers(1),
    );

    let report = with_timeout(runtime.run()).await?;
    assert_eq!(report.count(TaskState::Succeeded), 3);
    assert_eq!(executor.max_concurrency(), 1);
    Ok(())
}

#[tokio::test]
async fn unsupported_task_fails_without_running() -> TestResult {
    init_tracing();

    let graph = TaskGraph::builder()
        .with_task(TaskReference::sub_program(
            "orphan",
            Phase::Main,
            "not-registered",
            Vec::<String>::new(),
        ))
        .with_task(task("downstream", Phase::Main, &["orphan"]))
        .with_task(task("other", Phase::Main, &[]))
        .build()?;
    let executor = RecordingExecutor::new().supporting(TaskKind::Command);
    let runtime = Runtime::new(
        &graph,
        registry(&executor),
        TaskContext::default(),
        RuntimeOptions::with_workers(2),
    );

    let err = with_timeout(runtime.run()).await.unwrap_err();
    let PhasedagError::RunFailed { source, report, .. } = err else {
        panic!("expected RunFailed");
    };
    assert!(matches!(*source, PhasedagError::UnsupportedTask { .. }));

    let orphan = report.record(&id("orphan")).unwrap();
    assert_eq!(orphan.state, TaskState::Failed);
    assert!(orphan.started_at.is_none(), "never reached Running");
    assert_eq!(report.state_of(&id("downstream")), Some(TaskState::Skipped));
    assert_eq!(report.state_of(&id("other")), Some(TaskState::Succeeded));
    Ok(())
}

#[tokio::test]
async fn panicking_task_is_reported_as_failure() -> TestResult {
    init_tracing();

    let graph = TaskGraph::builder()
        .with_task(TaskReference::in_process("boom", Phase::Main, |_ctx| {
            panic!("task body exploded")
        }))
        .with_task(task("after", Phase::Main, &["boom"]))
        .build()?;
    let registry = Arc::new(ExecutorRegistry::with_defaults(Default::default()));
    let runtime = Runtime::new(
        &graph,
        registry,
        TaskContext::default(),
        RuntimeOptions::with_workers(1),
    );

    let err = with_timeout(runtime.run()).await.unwrap_err();
    let report = err.report().unwrap();
    assert_eq!(report.state_of(&id("boom")), Some(TaskState::Failed));
    assert!(report.record(&id("boom")).unwrap().error.as_deref().unwrap().contains("panicked"));
    assert_eq!(report.state_of(&id("after")), Some(TaskState::Skipped));
    Ok(())
}

#[tokio::test]
async fn cancellation_stops_new_work_but_runs_cleanup() -> TestResult {
    init_tracing();

    let graph = TaskGraph::builder()
        .with_task(task("long", Phase::Main, &[]))
        .with_task(task("next", Phase::Main, &["long"]))
        .with_task(task("export", Phase::Export, &[]))
        .with_task(task("tidy", Phase::Cleanup, &[]))
        .build()?;
    let executor = RecordingExecutor::new().with_delay("long", Duration::from_millis(100));
    let cancel = CancelHandle::new();
    let ctx = TaskContext::default().with_cancel(cancel.signal());
    let runtime = Runtime::new(&graph, registry(&executor), ctx, RuntimeOptions::with_workers(2));

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        })
    };

    let err = with_timeout(runtime.run()).await.unwrap_err();
    canceller.await?;

    let PhasedagError::Cancelled { report } = err else {
        panic!("expected Cancelled");
    };
    assert_eq!(report.status, RunStatus::Cancelled);
    // Already-dispatched work finishes.
    assert_eq!(report.state_of(&id("long")), Some(TaskState::Succeeded));
    assert_eq!(report.state_of(&id("next")), Some(TaskState::Skipped));
    assert_eq!(report.state_of(&id("export")), Some(TaskState::Pending));
    assert_eq!(executor.count("tidy"), 1);
    Ok(())
}

#[derive(Debug)]
struct Owner(&'static str);

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_tasks_keep_their_own_local_sessions() -> TestResult {
    init_tracing();

    let barrier = Arc::new(Barrier::new(2));
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let mut builder = TaskGraph::builder();
    for name in ["a", "b"] {
        let barrier = Arc::clone(&barrier);
        let seen = Arc::clone(&seen);
        builder = builder.with_task(TaskReference::in_process(name, Phase::Main, move |ctx| {
            let broker = ctx.broker();
            let mut handle = broker.attach(Scope::Local, |b| {
                b.put(Owner(name));
                Ok(())
            })?;

            // Both sessions are open before either task looks up its owner.
            barrier.wait();
            let during = broker.get::<Owner>()?.0;
            barrier.wait();
            if name == "a" {
                handle.close();
            }
            barrier.wait();
            let after = broker.find::<Owner>().map(|o| o.0).unwrap_or("none");

            seen.lock().unwrap().push(format!(
                "{name}: during={during} after={after} closed={}",
                handle.is_closed()
            ));
            Ok(())
        }));
    }
    let graph = builder.build()?;

    let broker = ResourceBroker::new();
    let ctx = TaskContext::default().with_broker(broker.clone());
    let registry = Arc::new(ExecutorRegistry::with_defaults(Default::default()));
    let runtime = Runtime::new(&graph, registry, ctx, RuntimeOptions::with_workers(2));

    let report = with_timeout(runtime.run()).await?;
    assert!(report.is_success());

    let mut seen = seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            "a: during=a after=none closed=true".to_string(),
            "b: during=b after=b closed=false".to_string(),
        ]
    );
    // Task-local sessions never land on the caller's broker.
    assert_eq!(broker.depth(Scope::Local), 0);
    Ok(())
}

/// Returns `Interrupted` as soon as the run is cancelled.
#[derive(Debug)]
struct StopsOnCancel;

impl TaskExecutor for StopsOnCancel {
    fn name(&self) -> &'static str {
        "stops-on-cancel"
    }

    fn is_supported(&self, _ctx: &TaskContext, _task: &TaskReference) -> bool {
        true
    }

    fn execute<'a>(&'a self, ctx: &'a TaskContext, _task: &'a TaskReference) -> ExecFuture<'a> {
        Box::pin(async move {
            ctx.cancel_signal().cancelled().await;
            Err(ExecutionError::Interrupted)
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interruption_racing_cancellation_reports_cancelled() -> TestResult {
    init_tracing();

    let graph = TaskGraph::builder()
        .with_task(task("waits", Phase::Main, &[]))
        .with_task(task("export", Phase::Export, &[]))
        .build()?;
    let registry = Arc::new(ExecutorRegistry::new().with_executor(StopsOnCancel));

    for _ in 0..100 {
        let cancel = CancelHandle::new();
        let ctx = TaskContext::default().with_cancel(cancel.signal());
        let runtime = Runtime::new(&graph, Arc::clone(&registry), ctx, RuntimeOptions::with_workers(1));

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2)).await;
            cancel.cancel();
        });

        let err = with_timeout(runtime.run()).await.unwrap_err();
        canceller.await?;

        let report = match err {
            PhasedagError::Cancelled { report } => report,
            other => panic!("expected Cancelled, got {other:?}"),
        };
        assert_eq!(report.status, RunStatus::Cancelled);
        assert_ne!(report.state_of(&id("waits")), Some(TaskState::Succeeded));
        assert_eq!(report.state_of(&id("export")), Some(TaskState::Pending));
    }
    Ok(())
}

#[tokio::test]
async fn aborted_ctrl_c_listener_leaves_the_run_uncancelled() {
    init_tracing();

    let cancel = CancelHandle::new();
    let listener = cancel.cancel_on_ctrl_c();
    listener.abort();

    let join = listener.await.unwrap_err();
    assert!(join.is_cancelled());
    assert!(!cancel.is_cancelled());
}
