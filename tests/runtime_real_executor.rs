// tests/runtime_real_executor.rs

use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;

use logictree::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, TreeControl};
use logictree::exec::RealExecutorBackend;
use logictree::fs::mock::MockFileSystem;
use logictree::job::Job;
use logictree::plugin::PluginRegistry;
use logictree::tree::{Tree, TreeBuilder};
use logictree::types::{Logical, LogicalState, ProcessState};
use logictree_test_utils::builders::{and, not, or, r, JobBuilder, JobsBuilder};
use logictree_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// Runs `root` of `jobs` to completion with the threaded executor.
async fn run_once(
    jobs: &BTreeMap<String, Job>,
    root: &str,
    fs: &Arc<MockFileSystem>,
) -> Result<Tree, Box<dyn Error>> {
    let registry = PluginRegistry::with_builtins(fs.clone());
    let tree = TreeBuilder::new(jobs, &registry).build(root)?;
    let root = tree.root();

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let control = TreeControl::new();
    let executor = RealExecutorBackend::new(tx.clone(), control.clone());
    tx.send(RuntimeEvent::Run { node: root }).await?;

    let options = RuntimeOptions {
        exit_when_idle: true,
        ..RuntimeOptions::default()
    };
    let runtime = Runtime::new(CoreRuntime::new(tree, options), tx, rx, executor)
        .with_control(control)
        .with_fs(fs.clone());
    Ok(with_timeout(runtime.run()).await?)
}

#[tokio::test]
async fn builtin_checkers_run_on_their_own_threads() -> TestResult {
    init_tracing();
    let fs = Arc::new(MockFileSystem::new());
    fs.add_file("/etc/app.toml", "port = 80");

    let jobs = JobsBuilder::new()
        .with_job(
            "Main",
            JobBuilder::new(and(vec![r("on"), r("config"), not(r("pidfile"))]))
                .checker("on", "constant", "true")
                .checker("config", "file_exists", "/etc/app.toml")
                .checker("pidfile", "file_exists", "/run/app.pid"),
        )
        .build();

    let tree = run_once(&jobs, "Main", &fs).await?;
    let root = tree.root();
    assert_eq!(tree.last_not_null(root), Logical::True);
    assert_eq!(tree.state(root), ProcessState::FINISHED);
    assert_eq!(tree.logical_state(root), LogicalState::Done);

    let config = tree.find_by_id("config").ok_or("no config node")?;
    let payload = tree.node(config).result.as_ref().and_then(|r| r.payload.clone());
    assert!(payload.is_some());
    Ok(())
}

#[tokio::test]
async fn a_fault_is_recorded_instead_of_failing_the_run() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    let jobs = JobsBuilder::new()
        .with_job(
            "Main",
            JobBuilder::new(or(vec![r("path"), r("fallback")]))
                .checker("path", "file_exists", "")
                .checker("fallback", "constant", "false"),
        )
        .build();

    let tree = run_once(&jobs, "Main", &fs).await?;
    let root = tree.root();
    let path = tree.find_by_id("path").ok_or("no path node")?;
    assert_eq!(tree.logical_state(path), LogicalState::Fault);
    assert!(tree.node(root).exceptions.contains_key("path"));
    // a faulted operand never counts, so one false cannot decide the OR
    assert_eq!(tree.last_not_null(root), Logical::Unknown);
    assert_eq!(tree.state(root), ProcessState::FINISHED);
    Ok(())
}

#[tokio::test]
async fn a_saved_tree_is_mounted_by_a_snapshot_job() -> TestResult {
    let fs = Arc::new(MockFileSystem::new());
    let remote = JobsBuilder::new()
        .with_job(
            "Remote",
            JobBuilder::new(and(vec![r("a"), r("b")]))
                .checker("a", "constant", "true")
                .checker("b", "constant", "7"),
        )
        .build();
    let saved = run_once(&remote, "Remote", &fs).await?;
    saved.save_snapshot(&*fs, Path::new("/var/remote.json"))?;

    let jobs = JobsBuilder::new()
        .with_job("Main", JobBuilder::new(r("Remote")))
        .with_job("Remote", JobBuilder::snapshot("/var/remote.json"))
        .build();
    let tree = run_once(&jobs, "Main", &fs).await?;

    let root = tree.root();
    assert_eq!(tree.last_not_null(root), Logical::True);
    let b = tree.find_by_path("Main/Remote/b").ok_or("mirror not mounted")?;
    assert_eq!(tree.last_not_null(b), Logical::True);
    Ok(())
}
