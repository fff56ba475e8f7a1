// src/dag/state.rs

use std::fmt;

/// Per-run state of a task.
///
/// `Pending -> Eligible -> Running -> {Succeeded, Failed}`, or
/// `Pending -> Skipped` when a blocker did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Waiting on blockers, or its phase has not started.
    Pending,
    /// All blockers succeeded; waiting for a worker slot.
    Eligible,
    /// Dispatched to an executor.
    Running,
    Succeeded,
    Failed,
    /// Can never run: a blocker failed or was skipped, or the run was cancelled.
    Skipped,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Skipped
        )
    }

    /// Terminal states that make a non-cleanup phase fail.
    pub fn is_unsuccessful(self) -> bool {
        matches!(self, TaskState::Failed | TaskState::Skipped)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Eligible => "eligible",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}
