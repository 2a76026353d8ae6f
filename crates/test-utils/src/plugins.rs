#![allow(dead_code)]

//! Plugins for tests: checks that resolve from their parameters, and
//! workers/loggers that record what they saw.

use std::sync::{Arc, Mutex};

use logictree::fs::mock::MockFileSystem;
use logictree::plugin::builtin::checkers::constant_outcome;
use logictree::plugin::{
    CheckContext, CheckFault, CheckOutcome, Checker, LogEntry, PluginFuture, PluginRegistry,
    TreeLogger, Trigger, TriggerContext, Worker, WorkerContext,
};

/// `fake`: resolves from its parameters like `constant`, counting runs.
/// Under `CoreHarness` it never runs; the test completes it by hand.
#[derive(Debug, Default)]
pub struct FakeChecker {
    pub runs: Mutex<usize>,
}

impl Checker for FakeChecker {
    fn run(&self, ctx: CheckContext) -> PluginFuture<'_, Result<CheckOutcome, CheckFault>> {
        Box::pin(async move {
            *self.runs.lock().unwrap() += 1;
            if ctx.parameters.trim() == "fault" {
                return Err(CheckFault::new("fake", "scripted fault"));
            }
            Ok(constant_outcome(&ctx.parameters))
        })
    }
}

/// What a `RecordingWorker` saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCall {
    pub node_id: String,
    pub event: String,
    pub parameters: String,
    pub resetting: bool,
}

#[derive(Debug, Default)]
pub struct RecordingWorker {
    pub calls: Arc<Mutex<Vec<WorkerCall>>>,
    pub breaks: Arc<Mutex<Vec<String>>>,
}

impl Worker for RecordingWorker {
    fn exec(&self, ctx: WorkerContext) -> PluginFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(WorkerCall {
                node_id: ctx.node_id,
                event: ctx.event.name,
                parameters: ctx.parameters,
                resetting: ctx.resetting,
            });
            Ok(())
        })
    }

    fn break_exec(&self, node_id: &str) {
        self.breaks.lock().unwrap().push(node_id.to_string());
    }

    fn exists(&self, parameters: &str) -> bool {
        parameters != "missing"
    }
}

#[derive(Debug, Default)]
pub struct RecordingLogger {
    pub entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl RecordingLogger {
    pub fn event_names(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event.name.clone())
            .collect()
    }
}

impl TreeLogger for RecordingLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

/// `manual`: never fires on its own; tests send `TriggerFired`.
#[derive(Debug, Default)]
pub struct ManualTrigger;

impl Trigger for ManualTrigger {
    fn start(&self, ctx: TriggerContext) -> PluginFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            ctx.cancel.cancelled().await;
            Ok(())
        })
    }
}

/// Handles to the recording plugins registered by [`test_registry`].
#[derive(Debug, Clone)]
pub struct Recorders {
    pub checker: Arc<FakeChecker>,
    pub worker: Arc<RecordingWorker>,
    pub logger: Arc<RecordingLogger>,
}

/// Built-ins over an empty mock filesystem plus `fake` (checker),
/// `manual` (trigger), `record` (worker and logger).
pub fn test_registry() -> (PluginRegistry, Recorders) {
    test_registry_with_fs(Arc::new(MockFileSystem::new()))
}

pub fn test_registry_with_fs(fs: Arc<MockFileSystem>) -> (PluginRegistry, Recorders) {
    let mut registry = PluginRegistry::with_builtins(fs);
    let recorders = Recorders {
        checker: Arc::new(FakeChecker::default()),
        worker: Arc::new(RecordingWorker::default()),
        logger: Arc::new(RecordingLogger::default()),
    };
    registry.register_checker("fake", recorders.checker.clone());
    registry.register_trigger("manual", Arc::new(ManualTrigger));
    registry.register_worker("record", recorders.worker.clone());
    registry.register_logger("record", recorders.logger.clone());
    (registry, recorders)
}
