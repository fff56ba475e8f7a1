// src/dag/task.rs

//! Immutable descriptions of schedulable units.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::exec::TaskContext;
use crate::types::Phase;

/// Stable task identifier used for blockers, logging and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Discriminant of [`TaskDescriptor`], used for dispatch and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Command,
    SubProgram,
    InProcess,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Command => "command",
            TaskKind::SubProgram => "sub-program",
            TaskKind::InProcess => "in-process",
        };
        f.write_str(s)
    }
}

/// An external program launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTask {
    /// Executable path; relative paths are resolved against the framework root.
    pub path: String,
    /// Argument tokens, may contain `${NAME}` placeholders.
    pub args: Vec<String>,
    /// Environment overrides merged over the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl CommandTask {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Invocation of a named program registered with the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubProgramTask {
    pub entry_point: String,
    pub args: Vec<String>,
}

/// Signature of an in-process task body.
pub type InProcessFn = dyn Fn(&TaskContext) -> anyhow::Result<()> + Send + Sync;

/// A callback executed inside the engine process.
#[derive(Clone)]
pub struct InProcessTask {
    callable: Arc<InProcessFn>,
}

impl InProcessTask {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&TaskContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            callable: Arc::new(f),
        }
    }

    pub fn callable(&self) -> Arc<InProcessFn> {
        Arc::clone(&self.callable)
    }
}

impl fmt::Debug for InProcessTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessTask").finish_non_exhaustive()
    }
}

/// Kind-specific execution descriptor.
#[derive(Debug, Clone)]
pub enum TaskDescriptor {
    Command(CommandTask),
    SubProgram(SubProgramTask),
    InProcess(InProcessTask),
}

impl TaskDescriptor {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskDescriptor::Command(_) => TaskKind::Command,
            TaskDescriptor::SubProgram(_) => TaskKind::SubProgram,
            TaskDescriptor::InProcess(_) => TaskKind::InProcess,
        }
    }
}

/// One schedulable unit: its phase, descriptor and blockers.
///
/// Built once by whatever compiles the workload and consumed read-only by
/// the scheduler.
#[derive(Debug, Clone)]
pub struct TaskReference {
    id: TaskId,
    phase: Phase,
    descriptor: TaskDescriptor,
    blockers: BTreeSet<TaskId>,
}

impl TaskReference {
    pub fn new(id: impl Into<TaskId>, phase: Phase, descriptor: TaskDescriptor) -> Self {
        Self {
            id: id.into(),
            phase,
            descriptor,
            blockers: BTreeSet::new(),
        }
    }

    pub fn command(id: impl Into<TaskId>, phase: Phase, command: CommandTask) -> Self {
        Self::new(id, phase, TaskDescriptor::Command(command))
    }

    pub fn sub_program<I, S>(
        id: impl Into<TaskId>,
        phase: Phase,
        entry_point: impl Into<String>,
        args: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            id,
            phase,
            TaskDescriptor::SubProgram(SubProgramTask {
                entry_point: entry_point.into(),
                args: args.into_iter().map(Into::into).collect(),
            }),
        )
    }

    pub fn in_process<F>(id: impl Into<TaskId>, phase: Phase, f: F) -> Self
    where
        F: Fn(&TaskContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(id, phase, TaskDescriptor::InProcess(InProcessTask::new(f)))
    }

    /// Add a blocker: `blocker` must succeed before this task may start.
    pub fn blocked_by(mut self, blocker: impl Into<TaskId>) -> Self {
        self.blockers.insert(blocker.into());
        self
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> TaskKind {
        self.descriptor.kind()
    }

    pub fn blockers(&self) -> &BTreeSet<TaskId> {
        &self.blockers
    }
}
