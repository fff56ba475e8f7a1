// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a manifest without semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    debug!(path = %path.display(), bytes = contents.len(), "read config file");
    parse_raw(&contents)
}

/// Deserialize manifest text.
pub fn parse_raw(contents: &str) -> Result<RawConfigFile> {
    Ok(toml::from_str(contents)?)
}

/// Deserialize and validate manifest text, compiling its works into a graph.
pub fn parse_and_validate(contents: &str) -> Result<ConfigFile> {
    ConfigFile::try_from(parse_raw(contents)?)
}

/// Read, validate and compile a manifest.
///
/// Rejected here, before anything runs:
/// - a manifest without works, `workers = 0`, an empty `cmd`;
/// - `after` naming an unknown work;
/// - blockers in a later phase and same-phase cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let config = ConfigFile::try_from(load_from_path(path)?)?;
    debug!(
        works = config.work.len(),
        phases = config.graph().phases().count(),
        "config validated"
    );
    Ok(config)
}
