// src/engine/mod.rs

//! Orchestration engine for phasedag.
//!
//! This module ties together:
//! - the per-phase scheduler ([`crate::dag::PhaseScheduler`])
//! - the bounded worker pool that runs eligible tasks
//! - completion events flowing back from workers
//! - cooperative cancellation
//!
//! The pure state machine lives in [`crate::dag`]; the async/IO shell is
//! implemented in [`runtime`].

use std::num::NonZeroUsize;
use std::time::Instant;

use crate::dag::TaskId;
use crate::errors::PhasedagError;

pub mod cancel;
pub mod report;
pub mod runtime;

pub use cancel::{CancelHandle, CancelSignal};
pub use report::{RunReport, RunStatus, TaskRecord};
pub use runtime::Runtime;

/// Outcome of a task body for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed,
}

/// Runtime options for the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Upper bound on tasks running at the same time within a phase.
    pub workers: usize,
}

impl RuntimeOptions {
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self { workers }
    }
}

/// Events flowing from workers back into the coordinator.
#[derive(Debug)]
pub enum RuntimeEvent {
    /// A task body returned (or panicked).
    TaskCompleted {
        task: TaskId,
        result: Result<(), PhasedagError>,
        finished_at: Instant,
    },
}
