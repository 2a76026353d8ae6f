// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::scheduler::RunContext;
use crate::engine::{RuntimeEvent, RuntimeOptions};
use crate::plugin::{Checker, LogEntry, TreeLogger, Trigger, Worker};
use crate::tree::event::names;
use crate::tree::{NodeEvent, NodeIndex, ResultMap, Tree, TreeEvent, WorkerId};
use crate::trigger::TriggerId;
use crate::types::{Logical, LogicalState, ProcessState};

/// Everything a check thread needs to run one check.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub node: NodeIndex,
    pub generation: u64,
    pub id: String,
    pub path: String,
    pub checker: Arc<dyn Checker>,
    pub parameters: String,
    pub environment: ResultMap,
    pub event: TreeEvent,
    /// Named lock the check must hold while running.
    pub lock: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub worker: WorkerId,
    pub sender: NodeIndex,
    pub plugin: Arc<dyn Worker>,
    pub node_id: String,
    pub parameters: String,
    pub event: TreeEvent,
    pub environment: ResultMap,
    pub resetting: bool,
}

#[derive(Debug, Clone)]
pub struct TriggerRequest {
    pub trigger: TriggerId,
    pub name: String,
    pub plugin: Arc<dyn Trigger>,
    pub parameters: String,
}

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    StartCheck(CheckRequest),
    CancelCheck { node: NodeIndex, generation: u64 },
    ExecWorker(WorkerRequest),
    BreakWorker {
        worker: WorkerId,
        sender: NodeIndex,
        plugin: Arc<dyn Worker>,
        node_id: String,
    },
    ArmTrigger(TriggerRequest),
    DisarmTrigger { trigger: TriggerId },
    Log {
        logger: Arc<dyn TreeLogger>,
        entry: LogEntry,
    },
    LoadSnapshot {
        node: NodeIndex,
        generation: u64,
        path: String,
    },
    /// Feed `RetryRun` back after `after`.
    ScheduleRetry { node: NodeIndex, after: Duration },
    /// Feed `DelayedRun` back after `after`.
    ScheduleRun { node: NodeIndex, after: Duration },
    /// Request that the process exits (used for `--once`).
    RequestExit,
}

/// A node-level change, reported to whoever embeds the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub node: NodeIndex,
    pub id: String,
    pub event: NodeEvent,
    pub logical: Logical,
    pub last_not_null: Logical,
    pub state: ProcessState,
    pub logical_state: LogicalState,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Node changes produced by the cascade, in publication order.
    pub notifications: Vec<Notification>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Route one runtime event into the scheduler. The caller settles the
/// cascade afterwards.
pub fn handle_event(tree: &mut Tree, event: RuntimeEvent) {
    match event {
        RuntimeEvent::Run { node } => {
            let event = external_event(tree, node, "Run");
            tree.run(node, RunContext::new(event));
        }
        RuntimeEvent::UserRun { node } => {
            info!(node = %tree.path(node), "user run");
            tree.user_run(node);
        }
        RuntimeEvent::UserBreak { node } => {
            info!(node = %tree.path(node), "user break");
            tree.user_break(node);
        }
        RuntimeEvent::Reset { node } => {
            tree.reset(node);
        }
        RuntimeEvent::CheckProgress {
            node,
            generation,
            progress,
        } => tree.check_progress(node, generation, progress),
        RuntimeEvent::CheckCompleted {
            node,
            generation,
            outcome,
        } => tree.complete_check(node, generation, outcome),
        RuntimeEvent::CheckFaulted {
            node,
            generation,
            fault,
        } => tree.fault_check(node, generation, fault),
        RuntimeEvent::TriggerFired { trigger } => {
            let event = match tree.trigger(trigger) {
                Some(shell) => TreeEvent::external("TriggerFired", &shell.name, &shell.job),
                None => {
                    warn!(%trigger, "fire for unknown trigger ignored");
                    return;
                }
            };
            tree.trigger_fired(trigger, event);
        }
        RuntimeEvent::RetryRun { node } => tree.retry(node),
        RuntimeEvent::DelayedRun { node } => {
            let event = external_event(tree, node, "Loop");
            tree.run(node, RunContext::new(event).triggered());
        }
        RuntimeEvent::SnapshotLoaded {
            node,
            generation,
            document,
        } => tree.snapshot_loaded(node, generation, document),
        RuntimeEvent::WorkerFinished { worker, sender } => {
            tree.worker_finished(worker, sender);
        }
        RuntimeEvent::ShutdownRequested => {
            debug!("shutdown requested");
        }
    }
}

/// Whether the `--once` exit condition holds: the root decided a run and
/// nothing is pending anywhere.
pub fn should_exit(tree: &Tree, options: &RuntimeOptions) -> bool {
    if !options.exit_when_idle {
        return false;
    }
    let root = tree.root();
    let state = tree.state(root);
    (state.is_ready() || state.contains(ProcessState::INTERNAL_ERROR)) && tree.is_idle()
}

fn external_event(tree: &Tree, node: NodeIndex, name: &str) -> TreeEvent {
    let n = tree.node(node);
    let mut event = TreeEvent::external(name, &n.id, &tree.path(node));
    event.results = tree.results_of(node).snapshot();
    event
}

/// Log entry for an event, used by the dispatcher.
pub(crate) fn log_entry(logger: &str, parameters: &str, event: &TreeEvent) -> LogEntry {
    LogEntry {
        logger: logger.to_string(),
        parameters: parameters.to_string(),
        event: event.clone(),
        timestamp: chrono::Utc::now(),
    }
}

/// Whether `name` is one of the semantic names a worker sees as a reset.
pub(crate) fn is_reset(name: &str) -> bool {
    name == names::RESET || name == names::any(names::RESET)
}
