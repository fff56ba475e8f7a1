use std::error::Error;
use std::fs;
use std::path::Path;

use phasedag::broker::ResourceBroker;
use phasedag::config::{load_and_validate, load_from_path, parse_and_validate, ConfigFile};
use phasedag::dag::{TaskDescriptor, TaskId};
use phasedag::errors::PhasedagError;
use phasedag::types::Phase;
use phasedag_test_utils::{init_tracing, ConfigFileBuilder, WorkConfigBuilder};

type TestResult = Result<(), Box<dyn Error>>;

const FULL_CONFIG: &str = r#"
[engine]
workers = 3
framework_root = "app"
launcher = "libexec/run.sh"

[env]
APP_HOME = "/opt/app"

[batch]
batch_id = "daily"
flow_id = "ingest"
user = "ops"

[batch.arguments]
date = "2026-10-18"

[work.fetch]
phase = "import"
cmd = "bin/fetch.sh"
args = ["${APP_HOME}/in"]

[work.load]
cmd = "bin/load.sh"
env = { MODE = "fast" }
after = ["fetch"]

[work.tidy]
phase = "cleanup"
cmd = "bin/tidy.sh"
"#;

fn write_config(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("Phasedag.toml");
    fs::write(&path, contents).expect("write config");
    path
}

#[test]
fn full_config_loads_and_compiles() -> TestResult {
    init_tracing();

    let dir = tempfile::tempdir()?;
    let cfg = load_and_validate(write_config(dir.path(), FULL_CONFIG))?;

    assert_eq!(cfg.engine.workers, Some(3));
    assert_eq!(cfg.batch.batch_id, "daily");
    assert_eq!(cfg.batch.flow_id, "ingest");
    assert_eq!(cfg.batch.user.as_deref(), Some("ops"));
    assert_eq!(cfg.batch.arguments.get("date").map(String::as_str), Some("2026-10-18"));

    let graph = cfg.graph();
    assert_eq!(graph.len(), 3);
    let phases: Vec<Phase> = graph.phases().map(|pg| pg.phase()).collect();
    assert_eq!(phases, vec![Phase::Import, Phase::Main, Phase::Cleanup]);

    let load = graph.task(&TaskId::from("load")).expect("load task");
    assert_eq!(load.phase(), Phase::Main);
    assert!(load.blockers().contains(&TaskId::from("fetch")));
    let TaskDescriptor::Command(cmd) = load.descriptor() else {
        panic!("works compile to command tasks");
    };
    assert_eq!(cmd.path, "bin/load.sh");
    assert_eq!(cmd.env.get("MODE").map(String::as_str), Some("fast"));

    let artifact = cfg.artifact();
    assert_eq!(artifact.batch_id(), "daily");
    assert_eq!(artifact.flow_id(), "ingest");

    let ctx = cfg.task_context(dir.path(), ResourceBroker::new());
    assert_eq!(ctx.framework_root(), dir.path().join("app"));
    assert_eq!(ctx.launcher(), Some(dir.path().join("app/libexec/run.sh")));
    assert_eq!(ctx.environment().get("APP_HOME").map(String::as_str), Some("/opt/app"));
    Ok(())
}

#[test]
fn defaults_apply_to_missing_sections() -> TestResult {
    let dir = tempfile::tempdir()?;
    let cfg = load_and_validate(write_config(
        dir.path(),
        "[work.only]\ncmd = \"bin/only.sh\"\n",
    ))?;

    assert_eq!(cfg.engine.workers, None);
    assert_eq!(cfg.batch.batch_id, "batch");
    assert_eq!(cfg.batch.flow_id, "main");
    assert!(cfg.env.is_empty());
    let only = cfg.graph().task(&TaskId::from("only")).expect("only task");
    assert_eq!(only.phase(), Phase::Main);
    Ok(())
}

#[test]
fn config_without_work_is_rejected() -> TestResult {
    let dir = tempfile::tempdir()?;
    let err = load_and_validate(write_config(dir.path(), "[engine]\nworkers = 2\n")).unwrap_err();
    assert!(matches!(err, PhasedagError::ConfigError(_)));
    Ok(())
}

#[test]
fn zero_workers_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_workers(0)
        .with_work("a", WorkConfigBuilder::new("bin/a").build())
        .raw();
    let err = ConfigFile::try_from(raw).unwrap_err();
    assert!(matches!(err, PhasedagError::ConfigError(msg) if msg.contains("workers")));
}

#[test]
fn unknown_after_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_work("a", WorkConfigBuilder::new("bin/a").after("ghost").build())
        .raw();
    let err = ConfigFile::try_from(raw).unwrap_err();
    assert!(matches!(err, PhasedagError::ConfigError(msg) if msg.contains("ghost")));
}

#[test]
fn cycles_surface_at_load_time() {
    let raw = ConfigFileBuilder::new()
        .with_work("a", WorkConfigBuilder::new("bin/a").after("b").build())
        .with_work("b", WorkConfigBuilder::new("bin/b").after("a").build())
        .raw();
    let err = ConfigFile::try_from(raw).unwrap_err();
    assert!(matches!(err, PhasedagError::DagCycle { phase: Phase::Main, .. }));
}

#[test]
fn blocker_in_later_phase_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_work("early", WorkConfigBuilder::new("bin/e").phase(Phase::Setup).after("late").build())
        .with_work("late", WorkConfigBuilder::new("bin/l").build())
        .raw();
    let err = ConfigFile::try_from(raw).unwrap_err();
    assert!(matches!(err, PhasedagError::BlockerInLaterPhase { .. }));
}

#[test]
fn unknown_phase_name_is_a_toml_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    let err = load_from_path(write_config(
        dir.path(),
        "[work.a]\ncmd = \"bin/a\"\nphase = \"lunch\"\n",
    ))
    .unwrap_err();
    assert!(matches!(err, PhasedagError::TomlError(_)));
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    let err = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, PhasedagError::IoError(_)));
    Ok(())
}

#[test]
fn builder_produces_a_runnable_graph() {
    let cfg = ConfigFileBuilder::new()
        .with_env("ROOT", "/srv")
        .with_batch_argument("date", "2026-10-18")
        .with_work("a", WorkConfigBuilder::new("bin/a").arg("${ROOT}").build())
        .with_work("b", WorkConfigBuilder::new("bin/b").env("X", "1").after("a").build())
        .build();

    assert_eq!(cfg.graph().len(), 2);
    assert_eq!(cfg.graph().dependents_of(&TaskId::from("a")), &[TaskId::from("b")]);
}

#[test]
fn inline_manifest_text_is_validated() -> TestResult {
    let cfg = parse_and_validate(
        "[batch]\nflow_id = \"inline\"\n\n[work.one]\ncmd = \"bin/one\"\nphase = \"export\"\n",
    )?;
    assert_eq!(cfg.batch.flow_id, "inline");
    assert_eq!(cfg.graph().tasks_in(Phase::Export).len(), 1);

    let err = parse_and_validate("[work.one]\ncmd = \"  \"\n").unwrap_err();
    assert!(matches!(err, PhasedagError::ConfigError(msg) if msg.contains("empty")));
    Ok(())
}
