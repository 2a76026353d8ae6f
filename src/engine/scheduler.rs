// src/engine/scheduler.rs

//! Per-node run state machine.
//!
//! ```text
//! None -> Waiting -> Working -> Finished
//!                           \-> Triggered (awaits the next fire)
//! ```
//!
//! A node may start when its state is `None`, `Finished` or `Triggered`.
//! Starting allocates a new run generation; breaks and resets bump it again
//! so late completions from a superseded run are dropped.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine::event_handlers::{CheckRequest, CoreCommand};
use crate::plugin::{CheckFault, CheckOutcome, CheckProgress};
use crate::tree::event::names;
use crate::tree::snapshot::TreeDocument;
use crate::tree::{Deferred, NodeEvent, NodeIndex, NodeKind, NodeResult, ResultMap, Tree, TreeEvent};
use crate::trigger::{TriggerClient, TriggerId};
use crate::types::{Logical, LogicalState, ProcessState};

/// Why a node is being broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakReason {
    /// User request: sets `UserAbort` and unregisters from the trigger.
    User,
    /// An ancestor with `break_with_result` decided.
    Result,
    /// An ancestor is being broken.
    Parent,
}

/// Answer of the controlled-tree gate.
#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    /// Proceed with this environment.
    Go(ResultMap),
    /// A preceding sibling is busy; try again later.
    Retry,
    /// Not allowed now; give up silently.
    Block,
}

#[derive(Debug, Clone)]
pub struct RunContext {
    pub event: TreeEvent,
    /// User-initiated run targeted at this node.
    pub user: bool,
    /// Caused by the node's own trigger; skips trigger registration.
    pub triggered: bool,
}

impl RunContext {
    pub fn new(event: TreeEvent) -> Self {
        Self {
            event,
            user: false,
            triggered: false,
        }
    }

    pub fn user(mut self) -> Self {
        self.user = true;
        self
    }

    pub fn triggered(mut self) -> Self {
        self.triggered = true;
        self
    }
}

fn constant_logical(value: &Value) -> Logical {
    match value {
        Value::Bool(b) => Logical::from_bool(*b),
        Value::Null => Logical::Unknown,
        _ => Logical::True,
    }
}

impl Tree {
    pub fn run(&mut self, idx: NodeIndex, ctx: RunContext) {
        if self.node(idx).detached {
            return;
        }
        if let Some(target) = self.node(idx).kind.connector_target() {
            if ctx.user {
                self.run(target, ctx);
            }
            return;
        }
        if !ctx.user && self.node(idx).state.is_busy() {
            debug!(node = %self.path(idx), "busy; run requested after current run");
            let node = self.node_mut(idx);
            node.run.run_requested = true;
            node.run.event = Some(ctx.event);
            return;
        }
        if !ctx.user && self.is_aborted(idx) {
            debug!(node = %self.path(idx), "user abort in effect; run ignored");
            return;
        }
        if ctx.user || self.node(idx).init_nodes {
            self.reset(idx);
        }
        self.start_gated(idx, ctx);
    }

    /// `idx` or one of its ancestors was broken by the user.
    fn is_aborted(&self, idx: NodeIndex) -> bool {
        let mut current = Some(idx);
        while let Some(i) = current {
            let node = self.node(i);
            if node.logical_state == LogicalState::UserAbort {
                return true;
            }
            current = node.parent;
        }
        false
    }

    fn start_gated(&mut self, idx: NodeIndex, ctx: RunContext) {
        let environment = match self.can_run(idx, ctx.user) {
            Gate::Go(environment) => environment,
            Gate::Retry => {
                self.request_retry(idx, ctx.event);
                return;
            }
            Gate::Block => {
                debug!(node = %self.path(idx), "run blocked by controlled tree");
                return;
            }
        };

        if !ctx.triggered {
            if let Some(trigger) = self.node(idx).trigger {
                self.start_trigger(trigger, TriggerClient::Node(idx));
                if self.trigger(trigger).is_some_and(|t| t.is_event_sourced()) {
                    debug!(node = %self.path(idx), "waiting for event-sourced trigger");
                    self.node_mut(idx).environment = environment;
                    return;
                }
            }
        }

        self.start_node(idx, environment, ctx);
    }

    /// Reset `idx` and run it, ignoring `UserAbort` on the way.
    pub fn user_run(&mut self, idx: NodeIndex) {
        if let Some(target) = self.node(idx).kind.connector_target() {
            return self.user_run(target);
        }
        let mut event = TreeEvent::external("UserRun", &self.node(idx).id, &self.path(idx));
        event.results = self.results_of(idx).snapshot();
        self.run(idx, RunContext::new(event).user());
    }

    pub fn user_break(&mut self, idx: NodeIndex) {
        self.break_node(idx, BreakReason::User);
    }

    /// Walk up from `idx` checking abort and controlled-sibling gates, and
    /// collect the environment the check will see.
    pub fn can_run(&self, idx: NodeIndex, user: bool) -> Gate {
        let mut environment = self.results_of(idx).snapshot();
        if !user && self.node(idx).logical_state == LogicalState::UserAbort {
            return Gate::Block;
        }

        let mut current = idx;
        while let Some(parent) = self.node(current).parent {
            let node = self.node(parent);
            if !user && node.logical_state == LogicalState::UserAbort {
                return Gate::Block;
            }
            if node.list().is_some_and(|spec| spec.controlled) {
                for sibling in &node.children {
                    if *sibling == current {
                        break;
                    }
                    let state = self.state(*sibling);
                    if state.is_busy() {
                        return Gate::Retry;
                    }
                    if state.is_none() {
                        return Gate::Block;
                    }
                    if let Some(result) = self.result(*sibling) {
                        environment.insert(result.id.clone(), result.clone());
                    }
                }
            }
            current = parent;
        }
        Gate::Go(environment)
    }

    pub(crate) fn ready_state(&self, idx: NodeIndex) -> ProcessState {
        if self.node(idx).trigger.is_some() {
            ProcessState::TRIGGERED
        } else {
            ProcessState::FINISHED
        }
    }

    /// Queue the run requested while `idx` was busy.
    pub(crate) fn after_run(&mut self, idx: NodeIndex) {
        let node = self.node_mut(idx);
        if !node.run.run_requested {
            return;
        }
        node.run.run_requested = false;
        let event = node.run.event.clone();
        let event = event
            .unwrap_or_else(|| TreeEvent::external("Rerun", &self.node(idx).id, &self.path(idx)));
        self.deferred.push_back(Deferred::Run { node: idx, event });
    }

    fn mark_started(&mut self, idx: NodeIndex, environment: ResultMap, event: &TreeEvent) -> u64 {
        let node = self.node_mut(idx);
        node.environment = environment;
        node.run.generation += 1;
        node.run.pending = true;
        node.run.retries = 0;
        node.run.run_requested = false;
        node.run.event = Some(event.clone());
        node.logical_state = LogicalState::Start;
        node.last_run = Some(Utc::now());
        let generation = node.run.generation;
        self.set_state(idx, ProcessState::WORKING);
        generation
    }

    fn start_node(&mut self, idx: NodeIndex, environment: ResultMap, ctx: RunContext) {
        let kind = self.node(idx).kind.clone();
        match kind {
            NodeKind::Constant { value } => {
                self.mark_started(idx, environment, &ctx.event);
                self.node_mut(idx).run.pending = false;
                let logical = constant_logical(&value);
                self.finish_run(idx, CheckOutcome::done(logical, Some(value)));
            }
            NodeKind::Checker {
                checker,
                parameters,
                ..
            } => {
                let generation = self.mark_started(idx, environment, &ctx.event);
                let node = self.node(idx);
                let request = CheckRequest {
                    node: idx,
                    generation,
                    id: node.id.clone(),
                    path: self.path(idx),
                    checker,
                    parameters,
                    environment: node.environment.clone(),
                    event: ctx.event,
                    lock: node.lock.clone(),
                };
                info!(node = %request.path, generation, "starting check");
                self.outbox.commands.push(CoreCommand::StartCheck(request));
            }
            NodeKind::List(spec) => {
                let node = self.node_mut(idx);
                node.environment = environment;
                node.logical_state = LogicalState::Start;
                node.last_run = Some(Utc::now());
                node.run.retries = 0;
                node.run.event = Some(ctx.event.clone());

                if spec.controlled {
                    if let Some(list) = node.list_mut() {
                        list.round_active = true;
                        list.cursor = 0;
                    }
                    self.run_round_from(idx, 0);
                } else {
                    for child in self.node(idx).children.clone() {
                        self.run(child, RunContext::new(ctx.event.clone()));
                    }
                    self.reevaluate(idx);
                }
                self.refresh_list_state(idx);
            }
            NodeKind::ValueModifier { .. } => {
                for child in self.node(idx).children.clone() {
                    self.run(child, RunContext::new(ctx.event.clone()));
                }
            }
            NodeKind::Snapshot { path } => {
                let generation = self.mark_started(idx, environment, &ctx.event);
                info!(node = %self.path(idx), %path, "loading snapshot");
                self.outbox.commands.push(CoreCommand::LoadSnapshot {
                    node: idx,
                    generation,
                    path,
                });
            }
            NodeKind::Mirror { .. } | NodeKind::NodeConnector { .. } | NodeKind::JobConnector { .. } => {}
        }
    }

    /// Start the children of a controlled list from `position` until one of
    /// them is busy; finish the round when none is left.
    pub(crate) fn run_round_from(&mut self, list: NodeIndex, position: usize) {
        let children = self.node(list).children.clone();
        let event = match self.node(list).run.event.clone() {
            Some(event) => event,
            None => TreeEvent::external("Run", &self.node(list).id, &self.path(list)),
        };
        for (pos, child) in children.iter().enumerate().skip(position) {
            if let Some(spec) = self.node_mut(list).list_mut() {
                spec.cursor = pos;
            }
            self.run(*child, RunContext::new(event.clone()));
            if self.state(*child).is_busy() {
                return;
            }
        }
        self.finish_round(list);
    }

    fn finish_round(&mut self, list: NodeIndex) {
        let Some(spec) = self.node_mut(list).list_mut() else {
            return;
        };
        spec.round_active = false;
        let looping = spec.looping;
        self.refresh_list_state(list);
        if looping && self.node(list).logical_state != LogicalState::UserAbort {
            let after = self.limits.loop_delay;
            debug!(list = %self.path(list), ?after, "scheduling next round");
            self.outbox
                .commands
                .push(CoreCommand::ScheduleRun { node: list, after });
        }
    }

    /// The awaited child of a controlled round finished.
    pub(crate) fn advance_round(&mut self, list: NodeIndex, from: NodeIndex) {
        let node = self.node(list);
        let Some(spec) = node.list() else {
            return;
        };
        if !spec.controlled || !spec.round_active {
            return;
        }
        let cursor = spec.cursor;
        let Some(child) = node.children.get(cursor).copied() else {
            return;
        };
        if child != from && self.effective(child) != from {
            return;
        }
        if let Some(spec) = self.node_mut(list).list_mut() {
            spec.cursor = cursor + 1;
        }
        self.deferred.push_back(Deferred::Advance {
            list,
            position: cursor + 1,
        });
    }

    /// A gated child gave up; end the round so the list does not hang.
    pub(crate) fn abort_round(&mut self, list: NodeIndex) {
        if let Some(spec) = self.node_mut(list).list_mut() {
            spec.round_active = false;
        }
    }

    fn accept(&self, idx: NodeIndex, generation: u64) -> bool {
        let node = self.node(idx);
        let current = !node.detached && node.run.pending && node.run.generation == generation;
        if !current {
            debug!(
                node = %self.path(idx),
                generation,
                current = node.run.generation,
                "dropping stale completion"
            );
        }
        current
    }

    pub fn check_progress(&mut self, idx: NodeIndex, generation: u64, progress: CheckProgress) {
        let node = self.node(idx);
        if node.detached || !node.run.pending || node.run.generation != generation {
            return;
        }
        self.set_logical(idx, progress.logical);
        self.publish(idx, NodeEvent::ProgressChanged);
        self.dispatch(idx, names::PROGRESS_CHANGED);
    }

    pub fn complete_check(&mut self, idx: NodeIndex, generation: u64, outcome: CheckOutcome) {
        if !self.accept(idx, generation) {
            return;
        }
        self.node_mut(idx).run.pending = false;
        info!(
            node = %self.path(idx),
            generation,
            logical = %outcome.logical,
            state = %outcome.logical_state,
            "check completed"
        );
        self.finish_run(idx, outcome);
    }

    pub fn fault_check(&mut self, idx: NodeIndex, generation: u64, fault: CheckFault) {
        if !self.accept(idx, generation) {
            return;
        }
        self.node_mut(idx).run.pending = false;
        warn!(node = %self.path(idx), generation, %fault, "check faulted");
        self.record_fault(idx, fault);
    }

    fn finish_run(&mut self, idx: NodeIndex, outcome: CheckOutcome) {
        let ready = self.ready_state(idx);
        let id = self.node(idx).id.clone();
        let result = NodeResult {
            id: id.clone(),
            logical: outcome.logical,
            state: ready,
            logical_state: outcome.logical_state,
            payload: outcome.payload,
            timestamp: Utc::now(),
        };
        self.results_of(idx).register(result.clone());

        let node = self.node_mut(idx);
        node.result = Some(result);
        node.logical_state = outcome.logical_state;
        let had_exceptions = !node.exceptions.is_empty();
        node.exceptions.clear();

        self.publish(idx, NodeEvent::ResultChanged);
        if had_exceptions {
            self.publish(idx, NodeEvent::ExceptionCleared { origin: id });
            self.dispatch(idx, names::EXCEPTION_CLEARED);
        }
        self.set_logical(idx, outcome.logical);
        self.set_state(idx, ready);
    }

    fn record_fault(&mut self, idx: NodeIndex, fault: CheckFault) {
        let ready = self.ready_state(idx);
        let id = self.node(idx).id.clone();
        let result = NodeResult {
            id: id.clone(),
            logical: Logical::Unknown,
            state: ready,
            logical_state: LogicalState::Fault,
            payload: None,
            timestamp: Utc::now(),
        };
        self.results_of(idx).register(result.clone());

        let node = self.node_mut(idx);
        node.result = Some(result);
        node.logical_state = LogicalState::Fault;
        node.exceptions.insert(id.clone(), fault);

        self.set_logical(idx, Logical::Unknown);
        self.publish(idx, NodeEvent::ExceptionRaised { origin: id });
        self.dispatch(idx, names::EXCEPTION);
        self.set_state(idx, ready);
    }

    pub fn snapshot_loaded(
        &mut self,
        idx: NodeIndex,
        generation: u64,
        document: Result<Box<TreeDocument>, String>,
    ) {
        if !self.accept(idx, generation) {
            return;
        }
        self.node_mut(idx).run.pending = false;
        match document {
            Ok(document) => {
                let logical = document.root.last_not_null;
                let logical_state = match document.root.logical_state {
                    LogicalState::Timeout => LogicalState::Timeout,
                    _ => LogicalState::Done,
                };
                self.mount_snapshot(idx, &document);
                self.finish_run(
                    idx,
                    CheckOutcome {
                        logical,
                        logical_state,
                        payload: None,
                    },
                );
            }
            Err(message) => {
                warn!(node = %self.path(idx), %message, "snapshot load failed");
                self.record_fault(idx, CheckFault::new("snapshot", message));
            }
        }
    }

    /// Fire every client of an armed trigger.
    pub fn trigger_fired(&mut self, trigger: TriggerId, event: TreeEvent) {
        let Some(shell) = self.triggers.get(trigger.0) else {
            return;
        };
        if !shell.is_armed() {
            debug!(trigger = %shell.name, "fire on disarmed trigger ignored");
            return;
        }
        let clients: Vec<TriggerClient> = shell.clients().collect();
        info!(trigger = %shell.name, clients = clients.len(), "trigger fired");
        for client in clients {
            match client {
                TriggerClient::Node(idx) => self.node_trigger_fired(idx, event.clone()),
                TriggerClient::Worker(worker) => self.worker_trigger_fired(worker, &event),
            }
        }
    }

    fn node_trigger_fired(&mut self, idx: NodeIndex, event: TreeEvent) {
        let state = self.node(idx).state;
        if state.contains(ProcessState::INTERNAL_ERROR) || state.contains(ProcessState::WAITING) {
            debug!(node = %self.path(idx), %state, "trigger fire ignored");
            return;
        }
        self.run(idx, RunContext::new(event).triggered());
    }

    /// `RetryRun`: try a gated start again.
    pub fn retry(&mut self, idx: NodeIndex) {
        let node = self.node(idx);
        if !node.run.run_requested || node.state != ProcessState::WAITING {
            return;
        }
        let event = match node.run.event.clone() {
            Some(event) => event,
            None => TreeEvent::external("Retry", &node.id, &self.path(idx)),
        };
        self.node_mut(idx).run.run_requested = false;
        self.start_gated(idx, RunContext::new(event).triggered());
    }

    fn request_retry(&mut self, idx: NodeIndex, event: TreeEvent) {
        let limits = self.limits;
        let node = self.node_mut(idx);
        node.run.retries += 1;
        node.run.event = Some(event);
        let retries = node.run.retries;

        if retries > limits.max_start_retries {
            node.run.run_requested = false;
            warn!(node = %self.path(idx), retries, "start retry budget exhausted");
            self.set_state(idx, ProcessState::INTERNAL_ERROR);
            if let Some(parent) = self.node(idx).parent {
                self.abort_round(parent);
                self.refresh_list_state(parent);
            }
            return;
        }

        node.run.run_requested = true;
        let busy = node.state.is_busy();
        if !busy {
            self.set_state(idx, ProcessState::WAITING);
        }
        debug!(node = %self.path(idx), retries, "start gated; retrying");
        self.outbox.commands.push(CoreCommand::ScheduleRetry {
            node: idx,
            after: limits.retry_interval,
        });
    }

    /// Cancel `idx` and its non-connector descendants.
    pub(crate) fn break_node(&mut self, idx: NodeIndex, reason: BreakReason) {
        if let Some(target) = self.node(idx).kind.connector_target() {
            if reason == BreakReason::User {
                self.break_node(target, reason);
            }
            return;
        }

        let child_reason = match reason {
            BreakReason::User => BreakReason::Parent,
            other => other,
        };
        for child in self.node(idx).children.clone() {
            if self.node(child).kind.is_connector() {
                continue;
            }
            self.break_node(child, child_reason);
        }

        let was_busy = self.node(idx).state.is_busy();
        let node = self.node_mut(idx);
        node.run.run_requested = false;
        if let Some(spec) = node.list_mut() {
            spec.round_active = false;
        }

        if reason == BreakReason::User {
            node.logical_state = LogicalState::UserAbort;
            if let Some(trigger) = node.trigger {
                self.stop_trigger(trigger, TriggerClient::Node(idx));
            }
        } else if was_busy {
            node.logical_state = LogicalState::None;
        }

        let node = self.node_mut(idx);
        if node.run.pending {
            node.run.pending = false;
            let generation = node.run.generation;
            node.run.generation += 1;
            self.outbox
                .commands
                .push(CoreCommand::CancelCheck { node: idx, generation });
        }

        if was_busy || reason == BreakReason::User {
            debug!(node = %self.path(idx), ?reason, "breaked");
            self.dispatch(idx, names::BREAKED);
        }
        if was_busy {
            if self.node(idx).list().is_some() {
                self.refresh_list_state(idx);
            } else {
                self.set_state(idx, ProcessState::FINISHED);
            }
        }
    }

    /// Clear cached outcome and run state of `idx` and its subtree.
    pub fn reset(&mut self, idx: NodeIndex) {
        if let Some(target) = self.node(idx).kind.connector_target() {
            return self.reset(target);
        }
        for child in self.node(idx).children.clone() {
            if !self.node(child).kind.is_connector() {
                self.reset(child);
            }
        }

        let node = self.node_mut(idx);
        if node.run.pending {
            let generation = node.run.generation;
            self.outbox
                .commands
                .push(CoreCommand::CancelCheck { node: idx, generation });
        }
        let node = self.node_mut(idx);
        node.run.pending = false;
        node.run.generation += 1;
        node.run.run_requested = false;
        node.run.retries = 0;
        node.run.event = None;
        node.result = None;
        node.environment.clear();
        node.logical_state = LogicalState::Done;
        if let Some(spec) = node.list_mut() {
            spec.round_active = false;
            spec.cursor = 0;
        }
        let origins: Vec<String> = std::mem::take(&mut node.exceptions).into_keys().collect();
        let id = node.id.clone();
        let had_last_not_null = node.last_not_null.is_known();

        self.results_of(idx).remove(&id);
        for origin in &origins {
            self.publish(
                idx,
                NodeEvent::ExceptionCleared {
                    origin: origin.clone(),
                },
            );
        }
        if !origins.is_empty() {
            self.dispatch(idx, names::EXCEPTION_CLEARED);
        }
        self.set_logical(idx, Logical::Unknown);
        if had_last_not_null {
            self.node_mut(idx).last_not_null = Logical::Unknown;
            self.publish(idx, NodeEvent::LastNotNullLogicalChanged);
            self.dispatch(idx, names::LAST_NOT_NULL_LOGICAL_CHANGED);
        }
        self.set_state(idx, ProcessState::NONE);
        self.dispatch(idx, names::RESET);
    }

    /// Cancel everything in flight and disarm all triggers.
    pub(crate) fn shutdown(&mut self) {
        let indices: Vec<NodeIndex> = self.indices().collect();
        for idx in indices {
            let node = self.node_mut(idx);
            if node.run.pending {
                node.run.pending = false;
                let generation = node.run.generation;
                node.run.generation += 1;
                self.outbox
                    .commands
                    .push(CoreCommand::CancelCheck { node: idx, generation });
            }
        }
        for i in 0..self.triggers.len() {
            let clients: Vec<TriggerClient> = self.triggers[i].clients().collect();
            for client in clients {
                self.stop_trigger(TriggerId(i), client);
            }
        }
        self.break_all_workers();
    }
}
