// src/exec/mod.rs

//! Task execution layer.
//!
//! The runtime never runs a task itself: it asks an [`ExecutorRegistry`]
//! for the first [`TaskExecutor`] that supports the task and awaits it.
//!
//! - [`command`] launches external processes with `tokio::process::Command`.
//! - [`sub_program`] runs named programs registered in a [`ProgramRegistry`].
//! - [`in_process`] runs callbacks on Tokio's blocking pool.
//! - [`registry`] holds the ordered executor list and dispatches.
//! - [`context`] provides the [`TaskContext`] every executor receives.

pub mod command;
pub mod context;
pub mod in_process;
pub mod registry;
pub mod sub_program;

use std::future::Future;
use std::pin::Pin;

use crate::dag::TaskReference;
use crate::errors::ExecutionError;

pub use command::CommandExecutor;
pub use context::TaskContext;
pub use in_process::InProcessExecutor;
pub use registry::ExecutorRegistry;
pub use sub_program::{Program, ProgramRegistry, SubProgramExecutor};

/// Future returned by [`TaskExecutor::execute`].
pub type ExecFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ExecutionError>> + Send + 'a>>;

/// Strategy capable of running one or more task kinds.
///
/// Executors are stateless with respect to the graph: everything they need
/// is the task itself plus the shared [`TaskContext`].
pub trait TaskExecutor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this executor can run `task`.
    fn is_supported(&self, ctx: &TaskContext, task: &TaskReference) -> bool;

    /// Run `task` to completion.
    fn execute<'a>(&'a self, ctx: &'a TaskContext, task: &'a TaskReference) -> ExecFuture<'a>;
}

/// Run a blocking closure on Tokio's blocking pool, mapping a panic to
/// [`ExecutionError::Panicked`].
pub(crate) async fn run_blocking<F>(f: F) -> Result<(), ExecutionError>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ExecutionError::Other),
        Err(join) if join.is_panic() => Err(ExecutionError::Panicked),
        Err(_) => Err(ExecutionError::Interrupted),
    }
}
