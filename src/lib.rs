// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod job;
pub mod logging;
pub mod plugin;
pub mod tree;
pub mod trigger;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::ConfigFile;
use crate::config::loader::load_and_validate;
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, TreeControl};
use crate::exec::RealExecutorBackend;
use crate::fs::{FileSystem, RealFileSystem};
use crate::plugin::PluginRegistry;
use crate::tree::{Tree, TreeBuilder};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - plugin registry and tree construction
/// - core runtime + async shell
/// - executor
/// - Ctrl-C handling
/// - the snapshot written on exit
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading config {:?}", args.config))?;
    if let Some(job) = &args.job {
        cfg = cfg.with_root_job(job)?;
    }

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let registry = build_registry(&cfg, Arc::clone(&fs));
    let tree = TreeBuilder::new(&cfg, &registry).build(cfg.root_job())?;

    if args.dry_run {
        print_dry_run(&cfg, &registry, &tree);
        return Ok(());
    }

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(256);
    let control = TreeControl::new();
    let executor = RealExecutorBackend::new(rt_tx.clone(), control.clone());

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let root = tree.root();
    info!(root = %tree.path(root), nodes = tree.len(), "seeding root run");
    rt_tx.send(RuntimeEvent::Run { node: root }).await?;

    let options = RuntimeOptions {
        exit_when_idle: args.once,
        limits: cfg.settings.limits,
    };
    let core = CoreRuntime::new(tree, options);
    let runtime = Runtime::new(core, rt_tx, rt_rx, executor)
        .with_control(control)
        .with_fs(Arc::clone(&fs));
    let tree = runtime.run().await?;

    info!(
        root = %tree.path(root),
        logical = %tree.last_not_null(root),
        state = %tree.state(root),
        "tree stopped"
    );

    let snapshot: Option<PathBuf> = args.snapshot_out.or(cfg.settings.snapshot_path.clone());
    if let Some(path) = snapshot {
        tree.save_snapshot(fs.as_ref(), &path)?;
        info!("tree snapshot written to {:?}", path);
    }
    Ok(())
}

fn build_registry(cfg: &ConfigFile, fs: Arc<dyn FileSystem>) -> PluginRegistry {
    let registry = PluginRegistry::with_builtins(fs);
    match &cfg.settings.plugin_dir {
        Some(dir) => registry.with_plugin_dir(dir),
        None => registry,
    }
}

/// Dry-run output: settings, the built tree, and the available plugins.
fn print_dry_run(cfg: &ConfigFile, registry: &PluginRegistry, tree: &Tree) {
    let limits = cfg.settings.limits;
    println!("logictree dry-run");
    println!("  config.root_job = {:?}", cfg.root_job());
    println!("  config.retry_interval = {:?}", limits.retry_interval);
    println!("  config.max_start_retries = {}", limits.max_start_retries);
    println!("  config.loop_delay = {:?}", limits.loop_delay);
    if let Some(path) = &cfg.settings.snapshot_path {
        println!("  config.snapshot_path = {:?}", path);
    }
    println!();

    println!("tree ({} nodes):", tree.len());
    print!("{}", tree.describe());
    println!();

    println!("plugins:");
    for (kind, names) in registry.names() {
        println!("  {kind}: {}", names.join(", "));
    }

    debug!("dry-run complete (no execution)");
}
