// src/errors.rs

//! Crate-wide error types.

use thiserror::Error;

use crate::dag::{TaskId, TaskKind};
use crate::engine::RunReport;
use crate::types::Phase;

#[derive(Error, Debug)]
pub enum PhasedagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("duplicate task id '{0}'")]
    DuplicateTask(TaskId),

    #[error("task '{task}' is blocked by unknown task '{blocker}'")]
    UnknownBlocker { task: TaskId, blocker: TaskId },

    #[error("task '{0}' cannot block itself")]
    SelfBlocker(TaskId),

    #[error(
        "task '{task}' ({phase}) is blocked by '{blocker}' from the later phase {blocker_phase}"
    )]
    BlockerInLaterPhase {
        task: TaskId,
        phase: Phase,
        blocker: TaskId,
        blocker_phase: Phase,
    },

    #[error("Cycle detected in DAG: phase {phase} has a blocker cycle involving task '{task}'")]
    DagCycle { phase: Phase, task: TaskId },

    #[error("resource not prepared: {0}")]
    ResourceNotPrepared(&'static str),

    #[error("failed to initialize resource session")]
    ResourceInit(#[source] anyhow::Error),

    #[error("unsupported task kind {kind} for task '{task}'")]
    UnsupportedTask { task: TaskId, kind: TaskKind },

    #[error("task '{task}' failed")]
    Execution {
        task: TaskId,
        #[source]
        source: ExecutionError,
    },

    #[error("batch run failed at {kind} task '{task}' in phase {phase}")]
    RunFailed {
        task: TaskId,
        phase: Phase,
        kind: TaskKind,
        #[source]
        source: Box<PhasedagError>,
        report: Box<RunReport>,
    },

    #[error("batch run was cancelled")]
    Cancelled { report: Box<RunReport> },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure of a single task body, as reported by a [`crate::exec::TaskExecutor`].
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("process exited with non-zero status {code}")]
    ExitStatus { code: i32 },

    #[error("process was terminated by a signal")]
    Signalled,

    #[error("failed to launch '{program}'")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("task was interrupted")]
    Interrupted,

    #[error("unresolved placeholder ${{{0}}}")]
    UnresolvedPlaceholder(String),

    #[error("unknown entry point '{0}'")]
    UnknownEntryPoint(String),

    #[error("task body panicked")]
    Panicked,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PhasedagError {
    /// The run report attached to a failed or cancelled run, if any.
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            PhasedagError::RunFailed { report, .. } | PhasedagError::Cancelled { report } => {
                Some(report)
            }
            _ => None,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PhasedagError>;
