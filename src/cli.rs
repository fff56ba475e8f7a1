// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `phasedag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "phasedag",
    version,
    about = "Run a phased batch of dependent tasks with a bounded worker pool.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Phasedag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Phasedag.toml")]
    pub config: String,

    /// Batch argument, overriding `[batch.arguments]`. Repeatable.
    #[arg(long = "arg", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub args: Vec<(String, String)>,

    /// Maximum concurrently running tasks, overriding `[engine].workers`.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: Option<u16>,

    /// Execution id for this run; generated when omitted.
    #[arg(long, value_name = "ID")]
    pub execution_id: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PHASEDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the phases and tasks, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Parse `KEY=VALUE`; the value may itself contain `=`.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
