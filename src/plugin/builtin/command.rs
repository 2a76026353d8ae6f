// src/plugin/builtin/command.rs

//! Shell commands as checks and workers.
//!
//! A check passes when the command exits with status 0, or when stdout
//! matches `match_stdout` if one is configured. Trimmed stdout becomes the
//! return payload (a number when it parses as one).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::plugin::manifest::{CommandManifest, ManifestCache};
use crate::plugin::{
    CheckContext, CheckFault, CheckOutcome, Checker, PluginFuture, Worker, WorkerContext,
};
use crate::types::Logical;

/// Fully resolved command invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub command: String,
    pub match_stdout: Option<Regex>,
    pub timeout: Option<Duration>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn inline(command: &str) -> Self {
        Self {
            command: command.to_string(),
            ..Self::default()
        }
    }

    pub fn from_manifest(manifest: &CommandManifest, parameters: &str) -> Self {
        Self {
            command: manifest.render(parameters),
            match_stdout: manifest.match_stdout.clone(),
            timeout: manifest.timeout,
            env: manifest.env.clone(),
        }
    }

    /// Platform shell invocation of the command line.
    fn shell(&self) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.command);
            c
        };
        cmd.envs(&self.env).kill_on_drop(true);
        cmd
    }
}

/// Number if `stdout` parses as one, text otherwise, nothing when empty.
pub fn parse_payload(stdout: &str) -> Option<Value> {
    let text = stdout.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::from(i));
    }
    if let Ok(f) = text.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Some(Value::Number(n));
        }
    }
    Some(Value::String(text.to_string()))
}

pub async fn run_check(spec: &CommandSpec, ctx: &CheckContext) -> Result<CheckOutcome, CheckFault> {
    let environment = serde_json::to_string(&ctx.environment)
        .map_err(|e| CheckFault::new("environment", e.to_string()))?;

    let mut cmd = spec.shell();
    cmd.env("LOGICTREE_NODE", &ctx.node_id)
        .env("LOGICTREE_PATH", &ctx.path)
        .env("LOGICTREE_EVENT", &ctx.event.name)
        .env("LOGICTREE_ENVIRONMENT", environment)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(node = %ctx.node_id, cmd = %spec.command, "spawning check command");
    let child = cmd
        .spawn()
        .map_err(|e| CheckFault::new("spawn", format!("spawning '{}': {e}", spec.command)))?;

    let output = match spec.timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(output) => output,
            Err(_) => {
                warn!(node = %ctx.node_id, cmd = %spec.command, ?limit, "check command timed out");
                return Ok(CheckOutcome::timeout());
            }
        },
        None => child.wait_with_output().await,
    }
    .map_err(|e| CheckFault::new("io", format!("waiting for '{}': {e}", spec.command)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        debug!(node = %ctx.node_id, "stderr: {}", stderr.trim());
    }

    let passed = match &spec.match_stdout {
        Some(re) => re.is_match(stdout.trim_end()),
        None => output.status.success(),
    };
    info!(
        node = %ctx.node_id,
        exit_code = output.status.code().unwrap_or(-1),
        passed,
        "check command exited"
    );
    Ok(CheckOutcome::done(Logical::from_bool(passed), parse_payload(&stdout)))
}

/// Run a worker command until it exits or `ctx.cancel` fires.
pub async fn run_worker(spec: &CommandSpec, ctx: &WorkerContext) -> Result<()> {
    let logical = ctx.event.logical.to_string();
    let mut cmd = spec.shell();
    cmd.env("LOGICTREE_NODE", &ctx.node_id)
        .env("LOGICTREE_EVENT", &ctx.event.name)
        .env("LOGICTREE_SOURCE", &ctx.event.source)
        .env("LOGICTREE_LOGICAL", logical)
        .env("LOGICTREE_RESETTING", if ctx.resetting { "1" } else { "0" })
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning worker command '{}'", spec.command))?;

    tokio::select! {
        status = child.wait() => {
            let status = status.with_context(|| format!("waiting for worker command '{}'", spec.command))?;
            if status.success() {
                debug!(node = %ctx.node_id, cmd = %spec.command, "worker command finished");
            } else {
                warn!(
                    node = %ctx.node_id,
                    cmd = %spec.command,
                    exit_code = status.code().unwrap_or(-1),
                    "worker command failed"
                );
            }
        }
        _ = ctx.cancel.cancelled() => {
            info!(node = %ctx.node_id, cmd = %spec.command, "worker broken; killing process");
            if let Err(e) = child.kill().await {
                warn!(node = %ctx.node_id, error = %e, "failed to kill worker process");
            }
        }
    }
    Ok(())
}

/// Whether the program a command line starts with can be found.
pub fn command_exists(command: &str) -> bool {
    let Some(program) = command.split_whitespace().next() else {
        return false;
    };
    if program.contains('/') || program.contains('\\') {
        return PathBuf::from(program).is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

/// `command`: parameters are the shell command line.
#[derive(Debug, Default)]
pub struct CommandChecker;

impl Checker for CommandChecker {
    fn run(&self, ctx: CheckContext) -> PluginFuture<'_, Result<CheckOutcome, CheckFault>> {
        Box::pin(async move { run_check(&CommandSpec::inline(&ctx.parameters), &ctx).await })
    }
}

#[derive(Debug, Default)]
pub struct CommandWorker;

impl Worker for CommandWorker {
    fn exec(&self, ctx: WorkerContext) -> PluginFuture<'_, Result<()>> {
        Box::pin(async move { run_worker(&CommandSpec::inline(&ctx.parameters), &ctx).await })
    }

    fn exists(&self, parameters: &str) -> bool {
        command_exists(parameters)
    }
}

/// Checker backed by a manifest file, re-read when it changes.
#[derive(Debug)]
pub struct ManifestChecker {
    pub path: PathBuf,
    pub cache: Arc<ManifestCache>,
}

impl Checker for ManifestChecker {
    fn run(&self, ctx: CheckContext) -> PluginFuture<'_, Result<CheckOutcome, CheckFault>> {
        Box::pin(async move {
            let manifest = self.cache.load(&self.path).map_err(CheckFault::from)?;
            let spec = CommandSpec::from_manifest(&manifest, &ctx.parameters);
            run_check(&spec, &ctx).await
        })
    }
}

#[derive(Debug)]
pub struct ManifestWorker {
    pub path: PathBuf,
    pub cache: Arc<ManifestCache>,
}

impl Worker for ManifestWorker {
    fn exec(&self, ctx: WorkerContext) -> PluginFuture<'_, Result<()>> {
        Box::pin(async move {
            let manifest = self.cache.load(&self.path)?;
            let spec = CommandSpec::from_manifest(&manifest, &ctx.parameters);
            run_worker(&spec, &ctx).await
        })
    }

    fn exists(&self, parameters: &str) -> bool {
        self.cache
            .load(&self.path)
            .map(|manifest| command_exists(&manifest.render(parameters)))
            .unwrap_or(false)
    }
}
