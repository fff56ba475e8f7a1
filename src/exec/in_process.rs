// src/exec/in_process.rs

use anyhow::anyhow;
use tracing::debug;

use crate::dag::{TaskDescriptor, TaskReference};

use super::{run_blocking, ExecFuture, TaskContext, TaskExecutor};

/// Runs [`TaskDescriptor::InProcess`] callbacks on Tokio's blocking pool.
#[derive(Debug, Clone, Default)]
pub struct InProcessExecutor;

impl InProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl TaskExecutor for InProcessExecutor {
    fn name(&self) -> &'static str {
        "in-process"
    }

    fn is_supported(&self, _ctx: &TaskContext, task: &TaskReference) -> bool {
        matches!(task.descriptor(), TaskDescriptor::InProcess(_))
    }

    fn execute<'a>(&'a self, ctx: &'a TaskContext, task: &'a TaskReference) -> ExecFuture<'a> {
        Box::pin(async move {
            let TaskDescriptor::InProcess(body) = task.descriptor() else {
                return Err(anyhow!("task '{}' is not an in-process task", task.id()).into());
            };
            debug!(task = %task.id(), "running in-process task body");
            let callable = body.callable();
            let ctx = ctx.clone();
            run_blocking(move || callable(&ctx)).await
        })
    }
}
