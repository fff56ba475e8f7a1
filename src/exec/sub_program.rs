// src/exec/sub_program.rs

//! Named programs invoked by [`TaskDescriptor::SubProgram`] tasks.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use tracing::info;

use crate::dag::{TaskDescriptor, TaskReference};
use crate::errors::ExecutionError;

use super::{run_blocking, ExecFuture, TaskContext, TaskExecutor};

/// An entry point that can be run as a sub-program.
pub trait Program: Send + Sync {
    fn run<'a>(&'a self, ctx: &'a TaskContext, args: &'a [String]) -> ExecFuture<'a>;
}

/// Adapts a blocking closure into a [`Program`] run on the blocking pool.
struct FnProgram<F> {
    f: Arc<F>,
}

impl<F> Program for FnProgram<F>
where
    F: Fn(&TaskContext, &[String]) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn run<'a>(&'a self, ctx: &'a TaskContext, args: &'a [String]) -> ExecFuture<'a> {
        let f = Arc::clone(&self.f);
        let ctx = ctx.clone();
        let args = args.to_vec();
        Box::pin(run_blocking(move || f(&ctx, &args)))
    }
}

/// Entry point name -> program.
#[derive(Clone, Default)]
pub struct ProgramRegistry {
    programs: HashMap<String, Arc<dyn Program>>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: Program + 'static>(&mut self, entry_point: impl Into<String>, program: P) {
        self.programs.insert(entry_point.into(), Arc::new(program));
    }

    /// Register a blocking closure as an entry point.
    pub fn register_fn<F>(&mut self, entry_point: impl Into<String>, f: F)
    where
        F: Fn(&TaskContext, &[String]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(entry_point, FnProgram { f: Arc::new(f) });
    }

    pub fn with_fn<F>(mut self, entry_point: impl Into<String>, f: F) -> Self
    where
        F: Fn(&TaskContext, &[String]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_fn(entry_point, f);
        self
    }

    pub fn get(&self, entry_point: &str) -> Option<Arc<dyn Program>> {
        self.programs.get(entry_point).cloned()
    }

    pub fn contains(&self, entry_point: &str) -> bool {
        self.programs.contains_key(entry_point)
    }
}

impl fmt::Debug for ProgramRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.programs.keys()).finish()
    }
}

/// Runs sub-program tasks whose entry point is registered.
///
/// Tasks naming an unknown entry point are not supported here, so dispatch
/// falls through to the next executor (or fails as unsupported).
#[derive(Debug, Clone, Default)]
pub struct SubProgramExecutor {
    programs: ProgramRegistry,
}

impl SubProgramExecutor {
    pub fn new(programs: ProgramRegistry) -> Self {
        Self { programs }
    }

    async fn run(&self, ctx: &TaskContext, task: &TaskReference) -> Result<(), ExecutionError> {
        let TaskDescriptor::SubProgram(sub) = task.descriptor() else {
            return Err(anyhow!("task '{}' is not a sub-program task", task.id()).into());
        };
        let program = self
            .programs
            .get(&sub.entry_point)
            .ok_or_else(|| ExecutionError::UnknownEntryPoint(sub.entry_point.clone()))?;

        let args = sub
            .args
            .iter()
            .map(|a| ctx.resolve(a))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            task = %task.id(),
            entry_point = %sub.entry_point,
            ?args,
            "starting sub-program"
        );
        program.run(ctx, &args).await
    }
}

impl TaskExecutor for SubProgramExecutor {
    fn name(&self) -> &'static str {
        "sub-program"
    }

    fn is_supported(&self, _ctx: &TaskContext, task: &TaskReference) -> bool {
        match task.descriptor() {
            TaskDescriptor::SubProgram(sub) => self.programs.contains(&sub.entry_point),
            _ => false,
        }
    }

    fn execute<'a>(&'a self, ctx: &'a TaskContext, task: &'a TaskReference) -> ExecFuture<'a> {
        Box::pin(self.run(ctx, task))
    }
}
