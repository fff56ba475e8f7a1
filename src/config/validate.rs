// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::dag::{TaskGraph, TaskGraphBuilder};
use crate::errors::{PhasedagError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PhasedagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let graph = validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, graph))
    }
}

/// Check a raw config and compile its works into a [`TaskGraph`].
///
/// Graph-level problems (unknown or later-phase blockers, cycles) are
/// reported by the graph builder itself.
pub fn validate_raw_config(cfg: &RawConfigFile) -> Result<TaskGraph> {
    ensure_has_work(cfg)?;
    validate_engine_config(cfg)?;
    validate_work(cfg)?;
    compile_graph(cfg)
}

fn ensure_has_work(cfg: &RawConfigFile) -> Result<()> {
    if cfg.work.is_empty() {
        return Err(PhasedagError::ConfigError(
            "config must contain at least one [work.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.engine.workers == Some(0) {
        return Err(PhasedagError::ConfigError(
            "[engine].workers must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_work(cfg: &RawConfigFile) -> Result<()> {
    for (name, work) in cfg.work.iter() {
        if work.cmd.trim().is_empty() {
            return Err(PhasedagError::ConfigError(format!(
                "work '{name}' has an empty `cmd`"
            )));
        }
        for dep in work.after.iter() {
            if !cfg.work.contains_key(dep) {
                return Err(PhasedagError::ConfigError(format!(
                    "work '{name}' has unknown dependency '{dep}' in `after`"
                )));
            }
        }
    }
    Ok(())
}

fn compile_graph(cfg: &RawConfigFile) -> Result<TaskGraph> {
    let mut builder = TaskGraphBuilder::new();
    for (name, work) in cfg.work.iter() {
        builder.add(work.to_task(name));
    }
    builder.build()
}
