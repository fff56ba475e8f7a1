// src/lib.rs

pub mod artifact;
pub mod broker;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod template;
pub mod types;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::artifact::ArtifactExecutor;
use crate::broker::ResourceBroker;
use crate::cli::CliArgs;
use crate::config::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::TaskDescriptor;
use crate::engine::RunReport;
use crate::exec::{ExecutorRegistry, ProgramRegistry};

/// Load the manifest and run it as one artifact.
///
/// `--arg` values override `[batch.arguments]`. Ctrl-C cancels the run;
/// CLEANUP still executes before this returns.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let broker = ResourceBroker::new();
    let ctx = cfg.task_context(&config_root_dir(&config_path), broker.clone());

    let mut batch_arguments = cfg.batch.arguments.clone();
    batch_arguments.extend(args.args.iter().cloned());

    let mut executor = ArtifactExecutor::new(ExecutorRegistry::with_defaults(
        ProgramRegistry::new(),
    ));
    if let Some(workers) = args.workers.map(usize::from).or(cfg.engine.workers) {
        executor = executor.with_workers(workers);
    }
    if let Some(user) = &cfg.batch.user {
        executor = executor.with_user(user.as_str());
    }
    if let Some(id) = &args.execution_id {
        executor = executor.with_execution_id(id.as_str());
    }

    // Ctrl-C -> cooperative cancellation; CLEANUP still runs.
    let ctrl_c = executor.cancel_handle().cancel_on_ctrl_c();

    let artifact = cfg.artifact();
    let result = executor.execute(&ctx, &artifact, batch_arguments).await;
    ctrl_c.abort();
    broker.close_all();

    let report = match result {
        Ok(report) => report,
        Err(err) => {
            if let Some(report) = err.report() {
                log_cleanup_warnings(report);
            }
            return Err(err.into());
        }
    };
    log_cleanup_warnings(&report);
    info!(
        run = %report.execution_id,
        tasks = report.tasks.len(),
        "batch completed successfully"
    );
    Ok(())
}

fn log_cleanup_warnings(report: &RunReport) {
    for warning in &report.cleanup_warnings {
        warn!(run = %report.execution_id, "{warning}");
    }
}

/// Base for a relative `framework_root`: the manifest's directory, or the
/// working directory for a bare file name.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Simple dry-run output: print phases, tasks, blockers and commands.
fn print_dry_run(cfg: &ConfigFile) {
    println!("phasedag dry-run");
    println!("  batch.batch_id = {}", cfg.batch.batch_id);
    println!("  batch.flow_id = {}", cfg.batch.flow_id);
    match cfg.engine.workers {
        Some(n) => println!("  engine.workers = {n}"),
        None => println!("  engine.workers = (available parallelism)"),
    }
    println!();

    let graph = cfg.graph();
    println!("tasks ({}):", graph.len());
    for pg in graph.phases() {
        println!("  phase {}:", pg.phase());
        for task in graph.tasks_in(pg.phase()) {
            println!("    - {} ({})", task.id(), task.kind());
            if let TaskDescriptor::Command(cmd) = task.descriptor() {
                println!("        cmd: {}", cmd.path);
                if !cmd.args.is_empty() {
                    println!("        args: {:?}", cmd.args);
                }
                if !cmd.env.is_empty() {
                    println!("        env: {:?}", cmd.env);
                }
            }
            let blockers: Vec<&str> = graph
                .blockers_of(task.id())
                .into_iter()
                .map(|b| b.as_str())
                .collect();
            if !blockers.is_empty() {
                println!("        after: {blockers:?}");
            }
        }
    }

    debug!("dry-run complete (no execution)");
}
