// src/plugin/mod.rs

//! Capability contracts for checks, triggers, workers and loggers.
//!
//! The tree only ever talks to these traits. Where an implementation comes
//! from (built in, or a command manifest on disk) is the business of
//! [`registry::PluginRegistry`].

pub mod builtin;
pub mod manifest;
pub mod registry;

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::tree::event::TreeEvent;
use crate::tree::result::ResultMap;
use crate::types::{Logical, LogicalState};

pub use registry::PluginRegistry;

/// Boxed future returned by plugin entry points.
pub type PluginFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Fault raised by a check. Recorded on the node, never returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct CheckFault {
    pub kind: String,
    pub message: String,
}

impl CheckFault {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for CheckFault {
    fn from(err: anyhow::Error) -> Self {
        CheckFault::new("error", format!("{err:#}"))
    }
}

/// Value a check produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub logical: Logical,
    /// `Done`, or `Timeout` when the plugin gave up waiting.
    pub logical_state: LogicalState,
    pub payload: Option<Value>,
}

impl CheckOutcome {
    pub fn done(logical: Logical, payload: Option<Value>) -> Self {
        Self {
            logical,
            logical_state: LogicalState::Done,
            payload,
        }
    }

    pub fn timeout() -> Self {
        Self {
            logical: Logical::Unknown,
            logical_state: LogicalState::Timeout,
            payload: None,
        }
    }
}

/// Intermediate report while a check is still working.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckProgress {
    pub percent: Option<u8>,
    /// Live value; unknown values never reach `LastNotNullLogical`.
    pub logical: Logical,
    pub message: Option<String>,
}

/// Callback a check uses to report progress.
#[derive(Clone)]
pub struct ProgressReporter(Arc<dyn Fn(CheckProgress) + Send + Sync>);

impl ProgressReporter {
    pub fn new(f: impl Fn(CheckProgress) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, progress: CheckProgress) {
        (self.0)(progress)
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressReporter")
    }
}

/// Everything a check sees when it runs.
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub node_id: String,
    pub path: String,
    pub parameters: String,
    /// Results of the job and of the node's predecessors, by id.
    pub environment: ResultMap,
    /// Event that caused this run.
    pub event: TreeEvent,
    pub progress: ProgressReporter,
}

/// A leaf check.
pub trait Checker: Send + Sync + fmt::Debug {
    fn run(&self, ctx: CheckContext) -> PluginFuture<'_, Result<CheckOutcome, CheckFault>>;
}

/// Callback a trigger invokes every time it fires.
#[derive(Clone)]
pub struct TriggerCallback(Arc<dyn Fn() + Send + Sync>);

impl TriggerCallback {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn fire(&self) {
        (self.0)()
    }
}

impl fmt::Debug for TriggerCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TriggerCallback")
    }
}

#[derive(Debug, Clone)]
pub struct TriggerContext {
    /// Trigger name as declared in its job.
    pub name: String,
    pub parameters: String,
    pub callback: TriggerCallback,
    /// Cancelled when the trigger is disarmed.
    pub cancel: CancellationToken,
}

/// An externally clocked source of re-runs.
pub trait Trigger: Send + Sync + fmt::Debug {
    /// Reject malformed parameters while the tree is built.
    fn validate(&self, _parameters: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Fire `ctx.callback` until `ctx.cancel` is cancelled.
    fn start(&self, ctx: TriggerContext) -> PluginFuture<'_, anyhow::Result<()>>;

    /// Next planned fire after `last`, when the trigger knows it.
    fn next_run(&self, _parameters: &str, _last: DateTime<Utc>) -> Option<DateTime<Utc>> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub node_id: String,
    pub parameters: String,
    pub event: TreeEvent,
    pub environment: ResultMap,
    /// The worker runs because its node is being reset.
    pub resetting: bool,
    pub cancel: CancellationToken,
}

/// Fire-and-forget side effect bound to an event.
pub trait Worker: Send + Sync + fmt::Debug {
    fn exec(&self, ctx: WorkerContext) -> PluginFuture<'_, anyhow::Result<()>>;

    /// Called when a complementary event terminates an outstanding execution.
    fn break_exec(&self, _node_id: &str) {}

    /// Whether the worker's target is usable (command present, etc.).
    fn exists(&self, _parameters: &str) -> bool {
        true
    }
}

/// Set of event names a logger wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Names(BTreeSet<String>),
}

impl EventFilter {
    /// `"*"` or empty selects everything; otherwise comma separated names.
    pub fn parse(parameters: &str) -> Self {
        let names: BTreeSet<String> = parameters
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if names.is_empty() || names.contains("*") {
            EventFilter::All
        } else {
            EventFilter::Names(names)
        }
    }

    pub fn accepts(&self, name: &str) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Names(names) => names.contains(name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Logger name as declared in its job.
    pub logger: String,
    pub parameters: String,
    pub event: TreeEvent,
    pub timestamp: DateTime<Utc>,
}

/// Sink for tree events.
pub trait TreeLogger: Send + Sync + fmt::Debug {
    fn log_events(&self, parameters: &str) -> EventFilter {
        EventFilter::parse(parameters)
    }

    fn log(&self, entry: &LogEntry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_filter_parsing() {
        assert_eq!(EventFilter::parse("*"), EventFilter::All);
        assert_eq!(EventFilter::parse(""), EventFilter::All);
        let filter = EventFilter::parse("Finished, Exception");
        assert!(filter.accepts("Finished"));
        assert!(filter.accepts("Exception"));
        assert!(!filter.accepts("Started"));
    }
}
