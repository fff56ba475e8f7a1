// src/logging.rs

//! `tracing` subscriber for the `phasedag` binary.
//!
//! The filter comes from, in order:
//! 1. `--log-level`, applied to every target;
//! 2. `PHASEDAG_LOG`, which takes a level (`debug`) or full `EnvFilter`
//!    directives (`phasedag::engine=debug,info`);
//! 3. `info`.
//!
//! Output goes to stderr; commands inherit stdout.

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

/// Environment variable consulted when no `--log-level` is given.
pub const LOG_ENV_VAR: &str = "PHASEDAG_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Install the global subscriber. Fails on a malformed `PHASEDAG_LOG` or
/// when a subscriber is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    fmt()
        .with_env_filter(build_filter(cli_level)?)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

fn build_filter(cli_level: Option<LogLevel>) -> Result<EnvFilter> {
    if let Some(level) = cli_level {
        return Ok(EnvFilter::new(directive(level)));
    }

    match std::env::var(LOG_ENV_VAR) {
        Ok(value) if !value.trim().is_empty() => EnvFilter::try_new(value.trim())
            .with_context(|| format!("invalid {LOG_ENV_VAR} value '{value}'")),
        _ => Ok(EnvFilter::new(DEFAULT_DIRECTIVE)),
    }
}

fn directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
