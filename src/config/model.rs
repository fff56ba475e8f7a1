// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::artifact::Artifact;
use crate::broker::ResourceBroker;
use crate::dag::{CommandTask, TaskGraph, TaskReference};
use crate::exec::TaskContext;
use crate::types::Phase;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [engine]
/// workers = 4
///
/// [env]
/// APP_HOME = "/opt/app"
///
/// [batch]
/// batch_id = "daily"
///
/// [batch.arguments]
/// date = "2026-10-18"
///
/// [work.load]
/// phase = "main"
/// cmd = "bin/load.sh"
/// args = ["${APP_HOME}/in"]
/// after = ["fetch"]
/// ```
///
/// All sections are optional except `[work.<name>]`, of which there must be
/// at least one.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineSection,

    /// Variables merged into every command's environment and available to
    /// `${NAME}` placeholders.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub batch: BatchSection,

    /// All works from `[work.<name>]`, keyed by name.
    #[serde(default)]
    pub work: BTreeMap<String, WorkConfig>,
}

/// Validated configuration plus the compiled task graph.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub engine: EngineSection,
    pub env: BTreeMap<String, String>,
    pub batch: BatchSection,
    pub work: BTreeMap<String, WorkConfig>,
    graph: TaskGraph,
}

impl ConfigFile {
    /// Assemble a config without re-validating it; used after
    /// `TryFrom<RawConfigFile>` has compiled `graph`.
    pub(crate) fn new_unchecked(raw: RawConfigFile, graph: TaskGraph) -> Self {
        Self {
            engine: raw.engine,
            env: raw.env,
            batch: raw.batch,
            work: raw.work,
            graph,
        }
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn artifact(&self) -> Artifact {
        Artifact::new(
            self.batch.batch_id.as_str(),
            self.batch.flow_id.as_str(),
            self.graph.clone(),
        )
    }

    /// Executor context for this config. A relative `framework_root` is
    /// taken relative to `base_dir` (usually the config file's directory).
    pub fn task_context(&self, base_dir: &Path, broker: ResourceBroker) -> TaskContext {
        let root = if self.engine.framework_root.is_absolute() {
            self.engine.framework_root.clone()
        } else {
            base_dir.join(&self.engine.framework_root)
        };

        let mut ctx = TaskContext::new(root)
            .with_environment(self.env.clone())
            .with_broker(broker);
        if let Some(launcher) = &self.engine.launcher {
            ctx = ctx.with_launcher(launcher);
        }
        ctx
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Maximum concurrently running tasks per phase.
    ///
    /// If `None`, the available parallelism is used.
    #[serde(default)]
    pub workers: Option<usize>,

    /// Base directory for relative command paths and the launcher.
    #[serde(default = "default_framework_root")]
    pub framework_root: PathBuf,

    /// Optional wrapper; every command runs as `<launcher> <cmd> <args..>`.
    #[serde(default)]
    pub launcher: Option<PathBuf>,
}

fn default_framework_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            workers: None,
            framework_root: default_framework_root(),
            launcher: None,
        }
    }
}

/// `[batch]` section: identity of the run.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSection {
    #[serde(default = "default_batch_id")]
    pub batch_id: String,

    #[serde(default = "default_flow_id")]
    pub flow_id: String,

    /// Defaults to `$USER` at run time.
    #[serde(default)]
    pub user: Option<String>,

    /// Batch arguments from `[batch.arguments]`; `--arg` overrides them.
    #[serde(default)]
    pub arguments: BTreeMap<String, String>,
}

fn default_batch_id() -> String {
    "batch".to_string()
}

fn default_flow_id() -> String {
    "main".to_string()
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            batch_id: default_batch_id(),
            flow_id: default_flow_id(),
            user: None,
            arguments: BTreeMap::new(),
        }
    }
}

/// `[work.<name>]` section: one command task.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkConfig {
    #[serde(default)]
    pub phase: Phase,

    /// Executable path, relative to the framework root unless absolute.
    pub cmd: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Per-work environment overrides.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Works that must succeed first (same or earlier phase).
    #[serde(default)]
    pub after: Vec<String>,
}

impl WorkConfig {
    pub fn to_task(&self, name: &str) -> TaskReference {
        let command = CommandTask {
            path: self.cmd.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
        };

        self.after
            .iter()
            .fold(TaskReference::command(name, self.phase, command), |task, dep| {
                task.blocked_by(dep.as_str())
            })
    }
}
