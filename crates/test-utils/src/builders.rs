use std::collections::BTreeMap;

use phasedag::config::{
    BatchSection, ConfigFile, EngineSection, RawConfigFile, WorkConfig,
};
use phasedag::dag::{CommandTask, TaskGraph, TaskReference};
use phasedag::types::Phase;

/// A placeholder command task; pair it with a `RecordingExecutor`.
pub fn task(id: &str, phase: Phase, blockers: &[&str]) -> TaskReference {
    blockers.iter().fold(
        TaskReference::command(id, phase, CommandTask::new("true")),
        |t, b| t.blocked_by(*b),
    )
}

/// `a -> {b, c} -> d`, all in `phase`.
pub fn diamond(phase: Phase) -> TaskGraph {
    TaskGraph::builder()
        .with_task(task("a", phase, &[]))
        .with_task(task("b", phase, &["a"]))
        .with_task(task("c", phase, &["a"]))
        .with_task(task("d", phase, &["b", "c"]))
        .build()
        .expect("diamond graph is valid")
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                engine: EngineSection::default(),
                env: BTreeMap::new(),
                batch: BatchSection::default(),
                work: BTreeMap::new(),
            },
        }
    }

    pub fn with_work(mut self, name: &str, work: WorkConfig) -> Self {
        self.config.work.insert(name.to_string(), work);
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.config.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.engine.workers = Some(workers);
        self
    }

    pub fn with_batch_argument(mut self, key: &str, value: &str) -> Self {
        self.config
            .batch
            .arguments
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `WorkConfig`.
pub struct WorkConfigBuilder {
    work: WorkConfig,
}

impl WorkConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            work: WorkConfig {
                phase: Phase::Main,
                cmd: cmd.to_string(),
                args: vec![],
                env: BTreeMap::new(),
                after: vec![],
            },
        }
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.work.phase = phase;
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.work.args.push(arg.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.work.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.work.after.push(dep.to_string());
        self
    }

    pub fn build(self) -> WorkConfig {
        self.work
    }
}
