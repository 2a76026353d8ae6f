// src/tree/dispatch.rs

//! Tree-wide dispatch of semantic events.
//!
//! For each dispatched name the dispatcher:
//! 1. fires internal triggers listening for that name on the sender,
//! 2. terminates outstanding workers bound to the complementary name,
//! 3. executes workers bound to the name and sender,
//! 4. hands the event to the sender's logger,
//!
//! and then repeats the dispatch as `Any<Name>` for every enclosing job.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::engine::event_handlers::{is_reset, log_entry};
use crate::engine::{CoreCommand, WorkerRequest};
use crate::plugin::{EventFilter, TreeLogger, Worker};
use crate::tree::event::names;
use crate::tree::{Deferred, NodeIndex, Tree, TreeEvent};
use crate::trigger::{GateChange, TriggerClient, TriggerId, TriggerSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoggerId(pub usize);

/// A worker definition resolved against the tree.
#[derive(Debug, Clone)]
pub struct WorkerBinding {
    pub job: NodeIndex,
    pub event: String,
    /// Node whose dispatches the worker reacts to.
    pub sender: NodeIndex,
    pub plugin: String,
    pub worker: Arc<dyn Worker>,
    pub parameters: String,
    pub trigger: Option<TriggerId>,
}

#[derive(Debug, Clone)]
pub struct LoggerBinding {
    pub name: String,
    pub logger: Arc<dyn TreeLogger>,
    pub parameters: String,
    pub filter: EventFilter,
}

/// Aggregate validity of the workers bound to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkersState {
    None,
    Valid,
    Invalid,
}

#[derive(Debug, Default)]
pub struct EventDispatcher {
    pub workers: Vec<WorkerBinding>,
    pub loggers: Vec<LoggerBinding>,
    /// Sender -> workers executed for it and not yet finished or broken.
    outstanding: BTreeMap<NodeIndex, BTreeSet<WorkerId>>,
}

impl EventDispatcher {
    pub fn add_worker(&mut self, binding: WorkerBinding) -> WorkerId {
        self.workers.push(binding);
        WorkerId(self.workers.len() - 1)
    }

    pub fn add_logger(&mut self, binding: LoggerBinding) -> LoggerId {
        self.loggers.push(binding);
        LoggerId(self.loggers.len() - 1)
    }

    pub fn worker(&self, id: WorkerId) -> Option<&WorkerBinding> {
        self.workers.get(id.0)
    }

    pub fn logger(&self, id: LoggerId) -> Option<&LoggerBinding> {
        self.loggers.get(id.0)
    }

    pub fn outstanding(&self, sender: NodeIndex) -> impl Iterator<Item = WorkerId> + '_ {
        self.outstanding.get(&sender).into_iter().flatten().copied()
    }

    pub fn is_outstanding(&self, worker: WorkerId, sender: NodeIndex) -> bool {
        self.outstanding
            .get(&sender)
            .is_some_and(|set| set.contains(&worker))
    }

    fn mark_outstanding(&mut self, worker: WorkerId, sender: NodeIndex) {
        self.outstanding.entry(sender).or_default().insert(worker);
    }

    fn clear_outstanding(&mut self, worker: WorkerId, sender: NodeIndex) -> bool {
        let Some(set) = self.outstanding.get_mut(&sender) else {
            return false;
        };
        let removed = set.remove(&worker);
        if set.is_empty() {
            self.outstanding.remove(&sender);
        }
        removed
    }

    fn all_outstanding(&self) -> Vec<(WorkerId, NodeIndex)> {
        self.outstanding
            .iter()
            .flat_map(|(sender, set)| set.iter().map(move |w| (*w, *sender)))
            .collect()
    }
}

impl Tree {
    /// Build the event record for a dispatch by `sender` on behalf of `source`.
    pub(crate) fn make_event(&mut self, source: NodeIndex, sender: NodeIndex, name: &str) -> TreeEvent {
        let seq = self.next_seq();
        let node = self.node(source);
        TreeEvent {
            seq,
            name: name.to_string(),
            source: node.id.clone(),
            sender: self.node(sender).id.clone(),
            path: self.path(source),
            logical: node.last_not_null,
            logical_state: node.logical_state,
            results: self.results_of(source).snapshot(),
            environment: node.environment.clone(),
        }
    }

    /// Dispatch `name` for `idx`, then `Any<name>` for each enclosing job.
    pub(crate) fn dispatch(&mut self, idx: NodeIndex, name: &str) {
        if self.node(idx).detached {
            return;
        }
        let event = self.make_event(idx, idx, name);
        self.dispatch_event(idx, event);

        if names::is_any(name) {
            return;
        }
        let any = names::any(name);
        for job in self.enclosing_jobs(idx) {
            let event = self.make_event(idx, job, &any);
            self.dispatch_event(job, event);
        }
    }

    fn dispatch_event(&mut self, sender: NodeIndex, event: TreeEvent) {
        debug!(event = %event.name, sender = %event.sender, source = %event.source, "dispatch");

        let fired: Vec<TriggerId> = self
            .triggers
            .iter()
            .enumerate()
            .filter(|(_, shell)| shell.listens(&event.name, sender))
            .map(|(i, _)| TriggerId(i))
            .collect();
        for trigger in fired {
            self.deferred.push_back(Deferred::Fire {
                trigger,
                event: event.clone(),
            });
        }

        if let Some(complement) = names::complement(&event.name) {
            let doomed: Vec<WorkerId> = self
                .dispatcher
                .outstanding(sender)
                .filter(|w| {
                    self.dispatcher
                        .worker(*w)
                        .is_some_and(|b| b.event == complement)
                })
                .collect();
            for worker in doomed {
                self.break_worker(worker, sender);
            }
        }

        let bound: Vec<WorkerId> = self
            .dispatcher
            .workers
            .iter()
            .enumerate()
            .filter(|(_, b)| b.sender == sender && b.event == event.name)
            .map(|(i, _)| WorkerId(i))
            .collect();
        for worker in bound {
            self.exec_worker(worker, sender, &event);
        }

        if let Some(logger) = self.node(sender).logger {
            if let Some(binding) = self.dispatcher.logger(logger) {
                if binding.filter.accepts(&event.name) {
                    self.outbox.commands.push(CoreCommand::Log {
                        logger: Arc::clone(&binding.logger),
                        entry: log_entry(&binding.name, &binding.parameters, &event),
                    });
                }
            }
        }
    }

    fn exec_worker(&mut self, worker: WorkerId, sender: NodeIndex, event: &TreeEvent) {
        let Some(binding) = self.dispatcher.worker(worker).cloned() else {
            return;
        };
        info!(%worker, plugin = %binding.plugin, event = %event.name, node = %event.sender, "executing worker");
        self.dispatcher.mark_outstanding(worker, sender);
        let node_id = self.node(sender).id.clone();
        let environment = self.node(sender).environment.clone();
        self.outbox.commands.push(CoreCommand::ExecWorker(WorkerRequest {
            worker,
            sender,
            plugin: binding.worker,
            node_id,
            parameters: binding.parameters,
            event: event.clone(),
            environment,
            resetting: is_reset(&event.name),
        }));
        if let Some(trigger) = binding.trigger {
            self.start_trigger(trigger, TriggerClient::Worker(worker));
        }
    }

    pub(crate) fn break_worker(&mut self, worker: WorkerId, sender: NodeIndex) {
        if !self.dispatcher.clear_outstanding(worker, sender) {
            return;
        }
        let Some(binding) = self.dispatcher.worker(worker).cloned() else {
            return;
        };
        debug!(%worker, node = %self.path(sender), "breaking outstanding worker");
        let node_id = self.node(sender).id.clone();
        self.outbox.commands.push(CoreCommand::BreakWorker {
            worker,
            sender,
            plugin: binding.worker,
            node_id,
        });
        if let Some(trigger) = binding.trigger {
            self.stop_trigger(trigger, TriggerClient::Worker(worker));
        }
    }

    /// A worker execution returned. Triggered workers stay outstanding until
    /// their complementary event breaks them.
    pub fn worker_finished(&mut self, worker: WorkerId, sender: NodeIndex) {
        let triggered = self
            .dispatcher
            .worker(worker)
            .is_some_and(|b| b.trigger.is_some());
        if !triggered {
            self.dispatcher.clear_outstanding(worker, sender);
        }
    }

    /// Re-execute a triggered worker that is still outstanding.
    pub(crate) fn worker_trigger_fired(&mut self, worker: WorkerId, event: &TreeEvent) {
        let Some(sender) = self.dispatcher.worker(worker).map(|b| b.sender) else {
            return;
        };
        if !self.dispatcher.is_outstanding(worker, sender) {
            return;
        }
        let mut event = event.clone();
        event.sender = self.node(sender).id.clone();
        self.exec_worker(worker, sender, &event);
    }

    pub(crate) fn break_all_workers(&mut self) {
        for (worker, sender) in self.dispatcher.all_outstanding() {
            self.break_worker(worker, sender);
        }
    }

    /// Register `client` with the trigger gate, arming the source when ready.
    pub(crate) fn start_trigger(&mut self, trigger: TriggerId, client: TriggerClient) {
        let Some(shell) = self.triggers.get_mut(trigger.0) else {
            return;
        };
        if shell.start(client) != GateChange::Armed {
            return;
        }
        info!(trigger = %shell.name, job = %shell.job, "trigger armed");
        if let TriggerSource::Plugin {
            trigger: plugin,
            parameters,
            ..
        } = &shell.source
        {
            let request = crate::engine::TriggerRequest {
                trigger,
                name: shell.name.clone(),
                plugin: Arc::clone(plugin),
                parameters: parameters.clone(),
            };
            self.outbox.commands.push(CoreCommand::ArmTrigger(request));
        }
    }

    pub(crate) fn stop_trigger(&mut self, trigger: TriggerId, client: TriggerClient) {
        let Some(shell) = self.triggers.get_mut(trigger.0) else {
            return;
        };
        if shell.stop(client) != GateChange::Disarmed {
            return;
        }
        info!(trigger = %shell.name, job = %shell.job, "trigger disarmed");
        if matches!(shell.source, TriggerSource::Plugin { .. }) {
            self.outbox
                .commands
                .push(CoreCommand::DisarmTrigger { trigger });
        }
    }

    /// Aggregate `exists()` of every worker bound to `idx`.
    pub fn workers_state(&self, idx: NodeIndex) -> WorkersState {
        let mut state = WorkersState::None;
        for binding in self.dispatcher.workers.iter().filter(|b| b.sender == idx) {
            if !binding.worker.exists(&binding.parameters) {
                return WorkersState::Invalid;
            }
            state = WorkersState::Valid;
        }
        state
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }
}
