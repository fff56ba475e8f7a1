use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use phasedag::dag::{TaskId, TaskKind, TaskReference};
use phasedag::errors::ExecutionError;
use phasedag::exec::{ExecFuture, TaskContext, TaskExecutor};

/// One finished invocation of a [`RecordingExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub task: TaskId,
    pub started: Instant,
    pub finished: Instant,
    pub succeeded: bool,
}

/// A fake executor that:
/// - records start/finish instants of every task it runs
/// - sleeps for a configurable delay instead of doing work
/// - fails the tasks it was told to fail
/// - tracks the highest number of tasks it ran at once
///
/// Clones share the same log, so a test keeps one clone for inspection and
/// hands another to the registry.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    log: Arc<Mutex<Vec<ExecutionRecord>>>,
    failing: HashSet<TaskId>,
    delays: HashMap<TaskId, Duration>,
    default_delay: Duration,
    kinds: Option<HashSet<TaskKind>>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, task: &str) -> Self {
        self.failing.insert(TaskId::from(task));
        self
    }

    pub fn with_delay(mut self, task: &str, delay: Duration) -> Self {
        self.delays.insert(TaskId::from(task), delay);
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Only claim tasks of `kind` (all kinds by default).
    pub fn supporting(mut self, kind: TaskKind) -> Self {
        self.kinds.get_or_insert_with(HashSet::new).insert(kind);
        self
    }

    pub fn executions(&self) -> Vec<ExecutionRecord> {
        self.log.lock().unwrap().clone()
    }

    /// Task ids in the order they finished.
    pub fn finished_order(&self) -> Vec<String> {
        self.executions()
            .into_iter()
            .map(|r| r.task.as_str().to_string())
            .collect()
    }

    pub fn count(&self, task: &str) -> usize {
        self.executions()
            .iter()
            .filter(|r| r.task.as_str() == task)
            .count()
    }

    pub fn record(&self, task: &str) -> Option<ExecutionRecord> {
        self.executions()
            .into_iter()
            .find(|r| r.task.as_str() == task)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    async fn run(&self, task: &TaskReference) -> Result<(), ExecutionError> {
        let started = Instant::now();
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now_running, Ordering::SeqCst);

        let delay = self
            .delays
            .get(task.id())
            .copied()
            .unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let succeeded = !self.failing.contains(task.id());
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(ExecutionRecord {
            task: task.id().clone(),
            started,
            finished: Instant::now(),
            succeeded,
        });

        if succeeded {
            Ok(())
        } else {
            Err(anyhow!("task '{}' failed on purpose", task.id()).into())
        }
    }
}

impl TaskExecutor for RecordingExecutor {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn is_supported(&self, _ctx: &TaskContext, task: &TaskReference) -> bool {
        self.kinds
            .as_ref()
            .is_none_or(|kinds| kinds.contains(&task.kind()))
    }

    fn execute<'a>(&'a self, _ctx: &'a TaskContext, task: &'a TaskReference) -> ExecFuture<'a> {
        Box::pin(self.run(task))
    }
}
