// src/engine/report.rs

use std::fmt;
use std::time::{Duration, Instant};

use crate::dag::{TaskId, TaskKind, TaskState};
use crate::types::Phase;

/// Aggregate status of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Final state of one task.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: TaskId,
    pub phase: Phase,
    pub kind: TaskKind,
    pub state: TaskState,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    /// Error with its cause chain, for `Failed` tasks.
    pub error: Option<String>,
}

impl TaskRecord {
    pub(crate) fn pending(id: TaskId, phase: Phase, kind: TaskKind) -> Self {
        Self {
            id,
            phase,
            kind,
            state: TaskState::Pending,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }
}

/// Outcome of an artifact run: returned on success, attached to
/// [`crate::errors::PhasedagError::RunFailed`] and
/// [`crate::errors::PhasedagError::Cancelled`] otherwise.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub execution_id: String,
    pub status: RunStatus,
    /// Every task of the graph, in phase then topological order.
    pub tasks: Vec<TaskRecord>,
    /// Failures of CLEANUP tasks; they never change `status`.
    pub cleanup_warnings: Vec<String>,
}

impl RunReport {
    pub fn record(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.tasks.iter().find(|r| &r.id == id)
    }

    pub fn state_of(&self, id: &TaskId) -> Option<TaskState> {
        self.record(id).map(|r| r.state)
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Number of tasks that ended in `state`.
    pub fn count(&self, state: TaskState) -> usize {
        self.tasks.iter().filter(|r| r.state == state).count()
    }
}
