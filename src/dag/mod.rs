// src/dag/mod.rs

//! Task graph model and per-phase scheduling.
//!
//! - [`task`] defines [`TaskReference`] and its execution descriptors.
//! - [`graph`] holds the frozen, phase-grouped [`TaskGraph`] and its builder.
//! - [`validate`] rejects duplicate ids, dangling blockers and cycles.
//! - [`scheduler`] contains the per-phase state machine that decides which
//!   tasks are eligible and which must be skipped.
//! - [`state`], [`state_manager`] and [`scheduler_step`] support it.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state;
pub mod state_manager;
pub mod task;
pub mod validate;

pub use graph::{PhaseGraph, TaskGraph, TaskGraphBuilder};
pub use scheduler::PhaseScheduler;
pub use scheduler_step::SchedulerStep;
pub use state::TaskState;
pub use task::{
    CommandTask, InProcessFn, InProcessTask, SubProgramTask, TaskDescriptor, TaskId, TaskKind,
    TaskReference,
};
