#![allow(dead_code)]

//! Drives a `CoreRuntime` synchronously, standing in for executor, timers
//! and triggers. Checks stay pending until the test completes them.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use logictree::engine::{
    CheckRequest, CoreCommand, CoreRuntime, CoreStep, Notification, RuntimeEvent, RuntimeOptions,
};
use logictree::job::Job;
use logictree::plugin::{CheckFault, CheckOutcome, CheckProgress};
use logictree::tree::{NodeEvent, NodeIndex, Tree, TreeBuilder};
use logictree::types::{Logical, LogicalState, ProcessState};

use crate::plugins::{test_registry, Recorders};

pub struct CoreHarness {
    pub core: CoreRuntime,
    pub recorders: Recorders,
    /// Every command the core produced, in order.
    pub commands: Vec<CoreCommand>,
    pub notifications: Vec<Notification>,
    pending: HashMap<NodeIndex, CheckRequest>,
    armed: BTreeSet<String>,
    pub keep_running: bool,
}

impl CoreHarness {
    pub fn new(jobs: BTreeMap<String, Job>, root: &str) -> Self {
        Self::with_options(jobs, root, RuntimeOptions::default())
    }

    pub fn with_options(jobs: BTreeMap<String, Job>, root: &str, options: RuntimeOptions) -> Self {
        let (registry, recorders) = test_registry();
        let tree = TreeBuilder::new(&jobs, &registry)
            .build(root)
            .expect("tree should build");
        Self::from_tree(tree, options, recorders)
    }

    pub fn from_tree(tree: Tree, options: RuntimeOptions, recorders: Recorders) -> Self {
        Self {
            core: CoreRuntime::new(tree, options),
            recorders,
            commands: Vec::new(),
            notifications: Vec::new(),
            pending: HashMap::new(),
            armed: BTreeSet::new(),
            keep_running: true,
        }
    }

    pub fn tree(&self) -> &Tree {
        self.core.tree()
    }

    /// Node by path (`Main/AND#1/A`) or by id.
    pub fn node(&self, key: &str) -> NodeIndex {
        let tree = self.tree();
        let found = if key.contains('/') {
            tree.find_by_path(key)
        } else {
            tree.find_by_id(key).or_else(|| tree.job(key))
        };
        found.unwrap_or_else(|| panic!("no node '{key}' in tree:\n{}", tree.describe()))
    }

    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        let step = self.core.step(event);
        for command in &step.commands {
            match command {
                CoreCommand::StartCheck(request) => {
                    self.pending.insert(request.node, request.clone());
                }
                CoreCommand::CancelCheck { node, generation } => {
                    if self
                        .pending
                        .get(node)
                        .is_some_and(|r| r.generation == *generation)
                    {
                        self.pending.remove(node);
                    }
                }
                CoreCommand::ArmTrigger(request) => {
                    self.armed.insert(request.name.clone());
                }
                CoreCommand::DisarmTrigger { trigger } => {
                    if let Some(shell) = self.core.tree().trigger(*trigger) {
                        self.armed.remove(&shell.name);
                    }
                }
                _ => {}
            }
        }
        self.commands.extend(step.commands.iter().cloned());
        self.notifications.extend(step.notifications.iter().cloned());
        self.keep_running = step.keep_running;
        step
    }

    pub fn run_root(&mut self) -> CoreStep {
        let node = self.tree().root();
        self.step(RuntimeEvent::Run { node })
    }

    pub fn run(&mut self, key: &str) -> CoreStep {
        let node = self.node(key);
        self.step(RuntimeEvent::Run { node })
    }

    pub fn user_run(&mut self, key: &str) -> CoreStep {
        let node = self.node(key);
        self.step(RuntimeEvent::UserRun { node })
    }

    pub fn user_break(&mut self, key: &str) -> CoreStep {
        let node = self.node(key);
        self.step(RuntimeEvent::UserBreak { node })
    }

    pub fn reset(&mut self, key: &str) -> CoreStep {
        let node = self.node(key);
        self.step(RuntimeEvent::Reset { node })
    }

    pub fn retry(&mut self, key: &str) -> CoreStep {
        let node = self.node(key);
        self.step(RuntimeEvent::RetryRun { node })
    }

    pub fn delayed_run(&mut self, key: &str) -> CoreStep {
        let node = self.node(key);
        self.step(RuntimeEvent::DelayedRun { node })
    }

    pub fn shutdown(&mut self) -> CoreStep {
        self.step(RuntimeEvent::ShutdownRequested)
    }

    fn pending_request(&self, key: &str) -> CheckRequest {
        let node = self.node(key);
        self.pending
            .get(&node)
            .cloned()
            .unwrap_or_else(|| panic!("no pending check for '{key}'"))
    }

    pub fn complete(&mut self, key: &str, logical: Logical) -> CoreStep {
        self.complete_with(key, CheckOutcome::done(logical, None))
    }

    pub fn complete_with(&mut self, key: &str, outcome: CheckOutcome) -> CoreStep {
        let request = self.pending_request(key);
        self.pending.remove(&request.node);
        self.step(RuntimeEvent::CheckCompleted {
            node: request.node,
            generation: request.generation,
            outcome,
        })
    }

    pub fn fault(&mut self, key: &str, kind: &str) -> CoreStep {
        let request = self.pending_request(key);
        self.pending.remove(&request.node);
        self.step(RuntimeEvent::CheckFaulted {
            node: request.node,
            generation: request.generation,
            fault: CheckFault::new(kind, "scripted"),
        })
    }

    pub fn progress(&mut self, key: &str, logical: Logical, percent: u8) -> CoreStep {
        let request = self.pending_request(key);
        self.step(RuntimeEvent::CheckProgress {
            node: request.node,
            generation: request.generation,
            progress: CheckProgress {
                percent: Some(percent),
                logical,
                message: None,
            },
        })
    }

    /// Fire the plugin trigger declared under `name`.
    pub fn fire(&mut self, name: &str) -> CoreStep {
        let trigger = self
            .tree()
            .triggers()
            .iter()
            .position(|t| t.name == name)
            .map(logictree::trigger::TriggerId)
            .unwrap_or_else(|| panic!("no trigger '{name}'"));
        self.step(RuntimeEvent::TriggerFired { trigger })
    }

    /// Report every executed worker as finished.
    pub fn finish_workers(&mut self) {
        let finished: Vec<_> = self
            .commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::ExecWorker(request) => Some((request.worker, request.sender)),
                _ => None,
            })
            .collect();
        for (worker, sender) in finished {
            if self.tree().dispatcher().is_outstanding(worker, sender) {
                self.step(RuntimeEvent::WorkerFinished { worker, sender });
            }
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains_key(&self.node(key))
    }

    /// Ids of checks currently waiting for a result, sorted.
    pub fn pending_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pending.values().map(|r| r.id.clone()).collect();
        ids.sort();
        ids
    }

    pub fn is_armed(&self, trigger: &str) -> bool {
        self.armed.contains(trigger)
    }

    pub fn logical(&self, key: &str) -> Logical {
        self.tree().logical(self.node(key))
    }

    pub fn last_not_null(&self, key: &str) -> Logical {
        self.tree().last_not_null(self.node(key))
    }

    pub fn state(&self, key: &str) -> ProcessState {
        self.tree().state(self.node(key))
    }

    pub fn logical_state(&self, key: &str) -> LogicalState {
        self.tree().logical_state(self.node(key))
    }

    pub fn root_logical(&self) -> Logical {
        self.tree().logical(self.tree().root())
    }

    /// Notifications of kind `event` published by `key` so far.
    pub fn count(&self, key: &str, event: &NodeEvent) -> usize {
        let node = self.node(key);
        self.notifications
            .iter()
            .filter(|n| n.node == node && &n.event == event)
            .count()
    }

    /// `(event name, node id)` of every worker execution so far.
    pub fn worker_runs(&self) -> Vec<(String, String)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::ExecWorker(request) => {
                    Some((request.event.name.clone(), request.node_id.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Event names handed to loggers so far.
    pub fn logged(&self) -> Vec<String> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::Log { entry, .. } => Some(entry.event.name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn scheduled_retries(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, CoreCommand::ScheduleRetry { .. }))
            .count()
    }

    pub fn scheduled_runs(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, CoreCommand::ScheduleRun { .. }))
            .count()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.notifications.clear();
    }
}
