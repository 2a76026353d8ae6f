// src/plugin/builtin/checkers.rs

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::fs::FileSystem;
use crate::plugin::{CheckContext, CheckFault, CheckOutcome, Checker, PluginFuture};
use crate::types::Logical;

/// `constant`: the parameters are the value.
///
/// `true`/`false` decide directly, numbers are true when non-zero, any other
/// text is true with the text as payload. Empty parameters stay unknown.
#[derive(Debug, Default)]
pub struct ConstantChecker;

pub fn constant_outcome(parameters: &str) -> CheckOutcome {
    let text = parameters.trim();
    if text.is_empty() {
        return CheckOutcome::done(Logical::Unknown, None);
    }
    match text.to_ascii_lowercase().as_str() {
        "true" => return CheckOutcome::done(Logical::True, Some(Value::Bool(true))),
        "false" => return CheckOutcome::done(Logical::False, Some(Value::Bool(false))),
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        return CheckOutcome::done(Logical::from_bool(i != 0), Some(Value::from(i)));
    }
    if let Ok(f) = text.parse::<f64>() {
        return CheckOutcome::done(Logical::from_bool(f != 0.0), Some(Value::from(f)));
    }
    CheckOutcome::done(Logical::True, Some(Value::String(text.to_string())))
}

impl Checker for ConstantChecker {
    fn run(&self, ctx: CheckContext) -> PluginFuture<'_, Result<CheckOutcome, CheckFault>> {
        Box::pin(async move { Ok(constant_outcome(&ctx.parameters)) })
    }
}

/// `file_exists`: true when the path in the parameters is a file or
/// directory. The payload is its modification time (RFC 3339).
#[derive(Debug)]
pub struct FileExistsChecker {
    fs: Arc<dyn FileSystem>,
}

impl FileExistsChecker {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl Checker for FileExistsChecker {
    fn run(&self, ctx: CheckContext) -> PluginFuture<'_, Result<CheckOutcome, CheckFault>> {
        Box::pin(async move {
            let raw = ctx.parameters.trim();
            if raw.is_empty() {
                return Err(CheckFault::new("parameters", "file_exists needs a path"));
            }
            let path = Path::new(raw);
            if !self.fs.exists(path) {
                return Ok(CheckOutcome::done(Logical::False, None));
            }
            let payload = self
                .fs
                .modified(path)
                .ok()
                .map(|t| Value::String(DateTime::<Utc>::from(t).to_rfc3339()));
            Ok(CheckOutcome::done(Logical::True, payload))
        })
    }
}
