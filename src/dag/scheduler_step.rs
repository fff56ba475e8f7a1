// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task::TaskId;

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step a phase and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks that became eligible to run as a result of this step.
    pub newly_eligible: Vec<TaskId>,
    /// Tasks that were newly marked as skipped in this step.
    pub newly_skipped: Vec<TaskId>,
    /// Whether every task of the phase is now terminal.
    pub phase_finished: bool,
}
