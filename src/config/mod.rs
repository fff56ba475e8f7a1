// src/config/mod.rs

//! Configuration loading and validation for phasedag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it and compile the declared works into a task graph (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_and_validate, parse_raw};
pub use model::{BatchSection, ConfigFile, EngineSection, RawConfigFile, WorkConfig};
pub use validate::validate_raw_config;
