// tests/config_loading.rs

use std::error::Error;
use std::fs;
use std::time::Duration;

use tempfile::TempDir;

use logictree::config::{load_and_validate, ConfigFile};
use logictree::engine::RuntimeOptions;
use logictree::errors::LogicTreeError;
use logictree::tree::TreeBuilder;
use logictree::types::{Logical, ProcessState};
use logictree_test_utils::builders::{and, r, refs, ConfigFileBuilder, JobBuilder};
use logictree_test_utils::plugins::test_registry;
use logictree_test_utils::CoreHarness;

type TestResult = Result<(), Box<dyn Error>>;

const SERVICE: &str = r#"
[config]
retry_interval = "250ms"
max_start_retries = 4

[job.Main]
logical = { op = "OR", operands = ["disk", { op = "NOT", operands = ["Db"] }] }

[job.Main.checkers.disk]
plugin = "fake"
parameters = "true"

[job.Db]
logical = "ping"

[job.Db.checkers.ping]
plugin = "fake"
parameters = "true"
"#;

fn write_config(contents: &str) -> Result<(TempDir, ConfigFile), LogicTreeError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("LogicTree.toml");
    fs::write(&path, contents)?;
    let cfg = load_and_validate(&path)?;
    Ok((dir, cfg))
}

fn load_err(contents: &str) -> LogicTreeError {
    match write_config(contents) {
        Ok(_) => panic!("config should be rejected:\n{contents}"),
        Err(err) => err,
    }
}

#[test]
fn a_loaded_config_builds_and_runs_a_tree() -> TestResult {
    let (_dir, cfg) = write_config(SERVICE)?;
    assert_eq!(cfg.root_job(), "Main");
    assert_eq!(cfg.settings.limits.retry_interval, Duration::from_millis(250));
    assert_eq!(cfg.settings.limits.max_start_retries, 4);
    assert_eq!(cfg.settings.limits.loop_delay, Duration::from_secs(1));

    let (registry, recorders) = test_registry();
    let tree = TreeBuilder::new(&cfg, &registry).build(cfg.root_job())?;
    let options = RuntimeOptions {
        exit_when_idle: false,
        limits: cfg.settings.limits,
    };
    let mut h = CoreHarness::from_tree(tree, options, recorders);

    h.run_root();
    assert_eq!(h.pending_ids(), vec!["disk", "ping"]);
    h.complete("ping", Logical::True);
    assert_eq!(h.root_logical(), Logical::Unknown);
    h.complete("disk", Logical::False);
    assert_eq!(h.root_logical(), Logical::False);
    assert_eq!(h.state("Main"), ProcessState::FINISHED);
    Ok(())
}

#[test]
fn the_root_job_can_be_replaced() -> TestResult {
    let (_dir, cfg) = write_config(SERVICE)?;
    let cfg = cfg.with_root_job("Db")?;
    assert_eq!(cfg.root_job(), "Db");

    let (_dir, cfg) = write_config(SERVICE)?;
    assert!(matches!(
        cfg.with_root_job("Web"),
        Err(LogicTreeError::JobNotFound(name)) if name == "Web"
    ));
    Ok(())
}

#[test]
fn the_first_job_is_the_root_without_main() -> TestResult {
    let (_dir, cfg) = write_config(
        r#"
        [job.Beta]
        logical = true

        [job.Alpha]
        logical = false
        "#,
    )?;
    assert_eq!(cfg.root_job(), "Alpha");
    Ok(())
}

#[test]
fn job_cycles_are_rejected() {
    let err = load_err(
        r#"
        [job.Main]
        logical = { op = "AND", operands = ["Other", "x"] }

        [job.Main.checkers.x]
        plugin = "constant"
        parameters = "true"

        [job.Other]
        logical = "Main"
        "#,
    );
    assert!(matches!(err, LogicTreeError::JobCycle(_)), "{err}");
}

#[test]
fn malformed_settings_are_config_errors() {
    let cases = [
        "[config]\nretry_interval = \"soon\"\n[job.Main]\nlogical = true",
        "[config]\nretry_interval = \"0ms\"\n[job.Main]\nlogical = true",
        "[job.Main]\nlogical = true\nsnapshot = \"state.json\"",
        "[job.Main]\nlogical = true\nlooping = true",
        "[job.Main]\nlogical = true\n[job.Main.checkers.c]\nplugin = \"\"",
        "[job.Main]\nlogical = true\n[job.Main.triggers.t]\nreference = \"c\"",
        "[job.Main]\nlogical = true\n[[job.Main.workers]]\nevent = \"\"\nplugin = \"log\"",
    ];
    for case in cases {
        let err = load_err(case);
        assert!(matches!(err, LogicTreeError::ConfigError(_)), "{case}: {err}");
    }
}

#[test]
fn unknown_keys_and_missing_files_are_reported() -> TestResult {
    let err = load_err("[config]\nwhatever = 1\n[job.Main]\nlogical = true");
    assert!(matches!(err, LogicTreeError::TomlError(_)), "{err}");

    let dir = tempfile::tempdir()?;
    assert!(load_and_validate(dir.path().join("absent.toml")).is_err());
    Ok(())
}

#[test]
fn unresolved_references_fail_the_build() -> TestResult {
    let (_dir, cfg) = write_config(
        r#"
        [job.Main]
        logical = { op = "AND", operands = ["known", "unknown"] }

        [job.Main.checkers.known]
        plugin = "constant"
        parameters = "true"
        "#,
    )?;
    let (registry, _) = test_registry();
    let err = match TreeBuilder::new(&cfg, &registry).build(cfg.root_job()) {
        Ok(_) => panic!("tree should not build"),
        Err(err) => err,
    };
    assert!(
        matches!(&err, LogicTreeError::UnresolvedReference { name, .. } if name == "unknown"),
        "{err}"
    );
    Ok(())
}

#[test]
fn built_configs_go_through_the_same_validation() {
    let cfg = ConfigFileBuilder::new()
        .with_job("Main", JobBuilder::new(and(refs(&["a", "Worker"]))).fakes(&["a"]))
        .with_job("Worker", JobBuilder::new(r("b")).fakes(&["b"]))
        .root_job("Worker")
        .retry_interval("2s")
        .max_start_retries(7)
        .build();

    assert_eq!(cfg.root_job(), "Worker");
    assert_eq!(cfg.jobs["Main"].name, "Main");
    assert_eq!(cfg.settings.limits.retry_interval, Duration::from_secs(2));
    assert_eq!(cfg.settings.limits.max_start_retries, 7);
}
