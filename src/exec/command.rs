// src/exec/command.rs

//! External process executor.

use std::process::Stdio;

use anyhow::{anyhow, Context};
use tokio::process::Command;
use tracing::{info, warn};

use crate::dag::{CommandTask, TaskDescriptor, TaskReference};
use crate::errors::ExecutionError;

use super::{ExecFuture, TaskContext, TaskExecutor};

/// Runs [`TaskDescriptor::Command`] tasks as child processes.
///
/// - the path and argument tokens have `${NAME}` placeholders expanded
/// - the context environment, then the task's overrides, are merged over
///   the inherited environment
/// - standard streams are inherited
/// - a non-zero exit status fails the task with its code
///
/// The child is killed if the task future is dropped or the run is
/// cancelled, so no process outlives its task.
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor;

impl CommandExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Build the process invocation for `cmd` without spawning it.
    pub fn build_command(
        ctx: &TaskContext,
        cmd: &CommandTask,
    ) -> Result<Command, ExecutionError> {
        let program = ctx.resolve_path(ctx.resolve_with(&cmd.path, &cmd.env)?);
        let args = cmd
            .args
            .iter()
            .map(|a| ctx.resolve_with(a, &cmd.env))
            .collect::<Result<Vec<_>, _>>()?;

        let mut command = match ctx.launcher() {
            Some(launcher) => {
                let mut c = Command::new(launcher);
                c.arg(&program);
                c
            }
            None => Command::new(&program),
        };

        command
            .args(&args)
            .envs(ctx.environment())
            .envs(&cmd.env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        Ok(command)
    }

    async fn run(&self, ctx: &TaskContext, task: &TaskReference) -> Result<(), ExecutionError> {
        let TaskDescriptor::Command(cmd) = task.descriptor() else {
            return Err(anyhow!("task '{}' is not a command task", task.id()).into());
        };

        let mut command = Self::build_command(ctx, cmd)?;
        let program = format!("{:?}", command.as_std().get_program());

        info!(
            task = %task.id(),
            phase = %task.phase(),
            program = %program,
            args = ?cmd.args,
            "starting task process"
        );

        let mut child = command
            .spawn()
            .map_err(|source| ExecutionError::Launch {
                program: program.clone(),
                source,
            })?;

        // Either the process exits on its own (normal case), or the run is
        // cancelled and we stop it.
        tokio::select! {
            status_res = child.wait() => {
                let status = status_res.with_context(|| {
                    format!("waiting for process of task '{}'", task.id())
                })?;

                info!(
                    task = %task.id(),
                    exit_code = status.code(),
                    success = status.success(),
                    "task process exited"
                );

                if status.success() {
                    Ok(())
                } else {
                    match status.code() {
                        Some(code) => Err(ExecutionError::ExitStatus { code }),
                        None => Err(ExecutionError::Signalled),
                    }
                }
            }

            _ = ctx.cancel_signal().cancelled() => {
                info!(
                    task = %task.id(),
                    "cancellation requested for running task; killing process"
                );
                if let Err(e) = child.kill().await {
                    warn!(
                        task = %task.id(),
                        error = %e,
                        "failed to kill child process on cancellation"
                    );
                }
                Err(ExecutionError::Interrupted)
            }
        }
    }
}

impl TaskExecutor for CommandExecutor {
    fn name(&self) -> &'static str {
        "command"
    }

    fn is_supported(&self, _ctx: &TaskContext, task: &TaskReference) -> bool {
        matches!(task.descriptor(), TaskDescriptor::Command(_))
    }

    fn execute<'a>(&'a self, ctx: &'a TaskContext, task: &'a TaskReference) -> ExecFuture<'a> {
        Box::pin(self.run(ctx, task))
    }
}
