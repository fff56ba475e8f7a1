// src/engine/runtime.rs

use std::collections::{HashMap, VecDeque};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::dag::{
    PhaseGraph, PhaseScheduler, TaskGraph, TaskId, TaskKind, TaskReference, TaskState,
};
use crate::errors::{ExecutionError, PhasedagError, Result};
use crate::exec::{ExecutorRegistry, TaskContext, TaskExecutor};
use crate::types::Phase;

use super::cancel::CancelSignal;
use super::report::{RunReport, RunStatus, TaskRecord};
use super::{RuntimeEvent, RuntimeOptions, TaskOutcome};

/// Drives a [`TaskGraph`] phase by phase.
///
/// Each phase gets its own [`PhaseScheduler`]; this struct is the IO shell
/// around it. It owns the state table, hands eligible tasks to a bounded
/// worker pool and feeds completion events back to the scheduler one at a
/// time, so a task's success is always applied before its dependents are
/// re-evaluated.
pub struct Runtime<'g> {
    graph: &'g TaskGraph,
    registry: Arc<ExecutorRegistry>,
    ctx: TaskContext,
    options: RuntimeOptions,
    execution_id: String,
}

impl fmt::Debug for Runtime<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("execution_id", &self.execution_id)
            .field("tasks", &self.graph.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<'g> Runtime<'g> {
    pub fn new(
        graph: &'g TaskGraph,
        registry: Arc<ExecutorRegistry>,
        ctx: TaskContext,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            graph,
            registry,
            ctx,
            options,
            execution_id: String::new(),
        }
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = execution_id.into();
        self
    }

    /// Run every phase in order.
    ///
    /// After a failure or cancellation the remaining non-CLEANUP phases are
    /// not started; CLEANUP always runs. Failures inside CLEANUP become
    /// warnings on the report.
    pub async fn run(&self) -> Result<RunReport> {
        info!(
            run = %self.execution_id,
            tasks = self.graph.len(),
            workers = self.options.workers,
            "runtime started"
        );

        let mut tracker = RunTracker::new(self.graph);

        for pg in self.graph.phases() {
            let phase = pg.phase();
            let cleanup = phase.is_cleanup();

            if !cleanup && self.ctx.is_cancelled() {
                tracker.cancelled = true;
            }
            if !cleanup && tracker.halted() {
                info!(
                    run = %self.execution_id,
                    phase = %phase,
                    tasks = pg.len(),
                    "not starting phase after earlier failure or cancellation"
                );
                continue;
            }

            let signal = if cleanup {
                CancelSignal::never()
            } else {
                self.ctx.cancel_signal().clone()
            };
            let ctx = self.ctx.with_cancel(signal);

            info!(run = %self.execution_id, phase = %phase, tasks = pg.len(), "phase started");
            let failed = self.run_phase(pg, &ctx, &mut tracker).await;
            info!(run = %self.execution_id, phase = %phase, failed, "phase finished");

            if failed && !cleanup {
                tracker.failed = true;
            }
        }

        tracker.finish(&self.execution_id)
    }

    async fn run_phase(&self, pg: &PhaseGraph, ctx: &TaskContext, tracker: &mut RunTracker) -> bool {
        let cleanup = pg.phase().is_cleanup();
        let cancel = ctx.cancel_signal().clone();
        let semaphore = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let (tx, mut rx) = mpsc::unbounded_channel::<RuntimeEvent>();

        let mut scheduler = PhaseScheduler::new(pg);
        let step = scheduler.start(&tracker.states);
        tracker.skip(&step.newly_skipped);
        let mut ready: VecDeque<TaskId> = step.newly_eligible.into();
        let mut in_flight = 0usize;
        let mut cancelled = false;

        while !scheduler.is_finished() {
            // A pending cancellation is handled by the `select!` below first.
            while !cancelled && !cancel.is_cancelled() {
                let Some(id) = ready.front().cloned() else {
                    break;
                };
                let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                    break;
                };
                ready.pop_front();

                let Some(task) = self.graph.shared_task(&id) else {
                    warn!(task = %id, "eligible task missing from graph; ignoring");
                    continue;
                };

                let Some(executor) = self.registry.select(ctx, &task) else {
                    let err = PhasedagError::UnsupportedTask {
                        task: id.clone(),
                        kind: task.kind(),
                    };
                    let step = scheduler.step_rejected(&id);
                    tracker.fail(&task, err, Instant::now(), cleanup);
                    tracker.skip(&step.newly_skipped);
                    continue;
                };

                if !scheduler.mark_running(&id) {
                    continue;
                }
                tracker.start(&id, Instant::now());
                in_flight += 1;
                spawn_worker(executor, ctx.clone(), task, permit, tx.clone());
            }

            if in_flight == 0 && (cancelled || ready.is_empty()) {
                // Nothing running and nothing dispatchable: settle what is left.
                let step = scheduler.cancel();
                tracker.skip(&step.newly_skipped);
                if !step.newly_skipped.is_empty() && !cancelled {
                    warn!(
                        phase = %pg.phase(),
                        skipped = step.newly_skipped.len(),
                        "phase stalled with unstarted tasks; skipping them"
                    );
                }
                break;
            }

            // Cancellation is observed before any completion that is ready
            // alongside it.
            tokio::select! {
                biased;

                _ = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    tracker.cancelled = true;
                    ready.clear();
                    let step = scheduler.cancel();
                    tracker.skip(&step.newly_skipped);
                    info!(
                        phase = %pg.phase(),
                        running = in_flight,
                        "cancellation: no new tasks will start in this phase"
                    );
                }

                event = rx.recv() => {
                    let Some(RuntimeEvent::TaskCompleted { task, result, finished_at }) = event else {
                        break;
                    };
                    in_flight = in_flight.saturating_sub(1);
                    if cancel.is_cancelled() {
                        tracker.cancelled = true;
                    }

                    let outcome = if result.is_ok() {
                        TaskOutcome::Success
                    } else {
                        TaskOutcome::Failed
                    };
                    let step = scheduler.step_completion(&task, outcome);

                    match result {
                        Ok(()) => tracker.succeed(&task, finished_at),
                        Err(err) => {
                            if let Some(reference) = self.graph.shared_task(&task) {
                                tracker.fail(&reference, err, finished_at, cleanup);
                            }
                        }
                    }
                    tracker.skip(&step.newly_skipped);
                    ready.extend(step.newly_eligible);
                }
            }
        }

        let failed = scheduler.has_failures();
        tracker.states.extend(scheduler.into_states());
        failed
    }
}

/// Run one task body on its own tokio task.
///
/// The body runs in a nested task so a panic is caught as a `JoinError`
/// and reported like any other failure. The permit is released before the
/// completion event is sent. Each task gets its own local broker stack.
fn spawn_worker(
    executor: Arc<dyn TaskExecutor>,
    ctx: TaskContext,
    task: Arc<TaskReference>,
    permit: OwnedSemaphorePermit,
    tx: mpsc::UnboundedSender<RuntimeEvent>,
) {
    let id = task.id().clone();
    debug!(task = %id, executor = executor.name(), "dispatching task");
    let broker = ctx.broker().task_view();
    let ctx = ctx.with_broker(broker);

    tokio::spawn(async move {
        let body = tokio::spawn(async move {
            executor
                .execute(&ctx, &task)
                .await
                .map_err(|source| PhasedagError::Execution {
                    task: task.id().clone(),
                    source,
                })
        });

        let result = match body.await {
            Ok(result) => result,
            Err(join) => Err(PhasedagError::Execution {
                task: id.clone(),
                source: if join.is_panic() {
                    ExecutionError::Panicked
                } else {
                    ExecutionError::Interrupted
                },
            }),
        };

        drop(permit);
        if tx
            .send(RuntimeEvent::TaskCompleted {
                task: id.clone(),
                result,
                finished_at: Instant::now(),
            })
            .is_err()
        {
            warn!(task = %id, "coordinator gone; dropping completion");
        }
    });
}

/// First non-CLEANUP failure of a run.
struct FirstFailure {
    task: TaskId,
    phase: Phase,
    kind: TaskKind,
    error: PhasedagError,
}

/// Bookkeeping for one run: final states, records and the first failure.
struct RunTracker {
    states: HashMap<TaskId, TaskState>,
    records: Vec<TaskRecord>,
    index: HashMap<TaskId, usize>,
    first_failure: Option<FirstFailure>,
    cleanup_warnings: Vec<String>,
    failed: bool,
    cancelled: bool,
}

impl RunTracker {
    fn new(graph: &TaskGraph) -> Self {
        let records: Vec<TaskRecord> = graph
            .phases()
            .flat_map(|pg| pg.tasks())
            .filter_map(|id| graph.task(id))
            .map(|t| TaskRecord::pending(t.id().clone(), t.phase(), t.kind()))
            .collect();
        let index = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();

        Self {
            states: HashMap::new(),
            records,
            index,
            first_failure: None,
            cleanup_warnings: Vec::new(),
            failed: false,
            cancelled: false,
        }
    }

    fn halted(&self) -> bool {
        self.failed || self.cancelled
    }

    fn record_mut(&mut self, id: &TaskId) -> Option<&mut TaskRecord> {
        let idx = *self.index.get(id)?;
        self.records.get_mut(idx)
    }

    fn start(&mut self, id: &TaskId, at: Instant) {
        if let Some(record) = self.record_mut(id) {
            record.state = TaskState::Running;
            record.started_at = Some(at);
        }
    }

    fn succeed(&mut self, id: &TaskId, at: Instant) {
        if let Some(record) = self.record_mut(id) {
            record.state = TaskState::Succeeded;
            record.finished_at = Some(at);
        }
        info!(task = %id, "task succeeded");
    }

    fn fail(&mut self, task: &TaskReference, err: PhasedagError, at: Instant, cleanup: bool) {
        let id = task.id();
        let message = error_chain(&err);
        if let Some(record) = self.record_mut(id) {
            record.state = TaskState::Failed;
            record.finished_at = Some(at);
            record.error = Some(message.clone());
        }

        if cleanup {
            warn!(task = %id, error = %message, "cleanup task failed");
            self.cleanup_warnings
                .push(format!("cleanup task '{id}' failed: {message}"));
            return;
        }

        warn!(task = %id, phase = %task.phase(), error = %message, "task failed");
        // Failures reported after cancellation (e.g. interrupted processes)
        // do not count as the run's cause.
        if self.first_failure.is_none() && !self.cancelled {
            self.first_failure = Some(FirstFailure {
                task: id.clone(),
                phase: task.phase(),
                kind: task.kind(),
                error: err,
            });
        }
    }

    fn skip(&mut self, ids: &[TaskId]) {
        for id in ids {
            if let Some(record) = self.record_mut(id) {
                record.state = TaskState::Skipped;
            }
        }
    }

    fn finish(self, execution_id: &str) -> Result<RunReport> {
        let status = if self.first_failure.is_some() || (self.failed && !self.cancelled) {
            RunStatus::Failed
        } else if self.cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Succeeded
        };

        let report = RunReport {
            execution_id: execution_id.to_string(),
            status,
            tasks: self.records,
            cleanup_warnings: self.cleanup_warnings,
        };

        info!(
            run = %execution_id,
            status = %status,
            succeeded = report.count(TaskState::Succeeded),
            failed = report.count(TaskState::Failed),
            skipped = report.count(TaskState::Skipped),
            cleanup_warnings = report.cleanup_warnings.len(),
            "runtime finished"
        );

        match (self.first_failure, status) {
            (Some(failure), _) => Err(PhasedagError::RunFailed {
                task: failure.task,
                phase: failure.phase,
                kind: failure.kind,
                source: Box::new(failure.error),
                report: Box::new(report),
            }),
            (None, RunStatus::Cancelled) => Err(PhasedagError::Cancelled {
                report: Box::new(report),
            }),
            (None, RunStatus::Failed) => Err(PhasedagError::Other(anyhow::anyhow!(
                "run {execution_id} failed without a failing task"
            ))),
            (None, RunStatus::Succeeded) => Ok(report),
        }
    }
}

/// `err: cause: cause` on a single line.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
