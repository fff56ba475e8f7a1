// src/exec/registry.rs

//! Ordered executor list with first-match dispatch.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::dag::TaskReference;
use crate::errors::{PhasedagError, Result};

use super::{
    CommandExecutor, InProcessExecutor, ProgramRegistry, SubProgramExecutor, TaskContext,
    TaskExecutor,
};

/// Prioritized executors; the first one reporting support runs the task.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: Vec<Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    /// An empty registry: every dispatch fails as unsupported.
    pub fn new() -> Self {
        Self::default()
    }

    /// Command, sub-program and in-process executors, in that order.
    pub fn with_defaults(programs: ProgramRegistry) -> Self {
        Self::new()
            .with_executor(CommandExecutor::new())
            .with_executor(SubProgramExecutor::new(programs))
            .with_executor(InProcessExecutor::new())
    }

    /// Append an executor with the lowest priority so far.
    pub fn with_executor<E: TaskExecutor + 'static>(mut self, executor: E) -> Self {
        self.executors.push(Arc::new(executor));
        self
    }

    /// Insert an executor ahead of every registered one.
    pub fn with_executor_first<E: TaskExecutor + 'static>(mut self, executor: E) -> Self {
        self.executors.insert(0, Arc::new(executor));
        self
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// First executor that supports `task`.
    pub fn select(&self, ctx: &TaskContext, task: &TaskReference) -> Option<Arc<dyn TaskExecutor>> {
        let found = self
            .executors
            .iter()
            .find(|e| e.is_supported(ctx, task))
            .cloned();
        if let Some(executor) = &found {
            debug!(task = %task.id(), executor = executor.name(), "selected executor");
        }
        found
    }

    /// Select an executor and run `task` with it.
    pub async fn dispatch(&self, ctx: &TaskContext, task: &TaskReference) -> Result<()> {
        let executor = self
            .select(ctx, task)
            .ok_or_else(|| PhasedagError::UnsupportedTask {
                task: task.id().clone(),
                kind: task.kind(),
            })?;

        executor
            .execute(ctx, task)
            .await
            .map_err(|source| PhasedagError::Execution {
                task: task.id().clone(),
                source,
            })
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.executors.iter().map(|e| e.name()))
            .finish()
    }
}
