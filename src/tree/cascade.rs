// src/tree/cascade.rs

//! Change propagation.
//!
//! A node never calls into its parent directly. [`Tree::publish`] queues one
//! [`Pending`] item per observer (the parent, plus the parent of every
//! connector aliasing the node) and [`Tree::settle`] drains the queue
//! iteratively, re-evaluating each affected list. Runs caused while
//! draining are deferred until the queue is empty.

use tracing::{debug, trace};

use crate::engine::scheduler::{BreakReason, RunContext};
use crate::engine::Notification;
use crate::tree::compare::convert;
use crate::tree::evaluator::Tally;
use crate::tree::event::names;
use crate::tree::{Deferred, NodeEvent, NodeIndex, NodeKind, Pending, Tree};
use crate::types::{Logical, LogicalState, ProcessState};

impl Tree {
    /// Observers notified when `idx` publishes.
    fn observers(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let node = self.node(idx);
        let mut out: Vec<NodeIndex> = node.parent.into_iter().collect();
        for alias in &node.aliases {
            if let Some(parent) = self.node(*alias).parent {
                if !out.contains(&parent) {
                    out.push(parent);
                }
            }
        }
        out
    }

    /// Record a change of `idx` and queue it for every observer.
    pub(crate) fn publish(&mut self, idx: NodeIndex, event: NodeEvent) {
        let node = self.node(idx);
        if node.detached {
            return;
        }
        self.outbox.notifications.push(Notification {
            node: idx,
            id: node.id.clone(),
            event: event.clone(),
            logical: node.logical,
            last_not_null: node.last_not_null,
            state: node.state,
            logical_state: node.logical_state,
        });
        for target in self.observers(idx) {
            self.queue.push_back(Pending {
                target,
                from: idx,
                event: event.clone(),
            });
        }
    }

    /// Set the live value; the last-not-null value follows decided values.
    pub(crate) fn set_logical(&mut self, idx: NodeIndex, value: Logical) {
        let node = self.node_mut(idx);
        if node.logical != value {
            node.logical = value;
            self.publish(idx, NodeEvent::LogicalChanged);
            self.dispatch(idx, names::LOGICAL_CHANGED);
        }
        if value.is_known() {
            self.set_last_not_null(idx, value);
        }
    }

    pub(crate) fn set_last_not_null(&mut self, idx: NodeIndex, value: Logical) {
        let node = self.node_mut(idx);
        if node.last_not_null == value {
            return;
        }
        node.last_not_null = value;
        debug!(node = %self.path(idx), logical = %value, "last-not-null logical changed");
        self.publish(idx, NodeEvent::LastNotNullLogicalChanged);
        self.dispatch(idx, names::LAST_NOT_NULL_LOGICAL_CHANGED);
        match value {
            Logical::True => self.dispatch(idx, names::LAST_NOT_NULL_LOGICAL_TO_TRUE),
            Logical::False => self.dispatch(idx, names::LAST_NOT_NULL_LOGICAL_TO_FALSE),
            Logical::Unknown => {}
        }
    }

    /// Move `idx` to `state`, publishing the progress edges.
    pub(crate) fn set_state(&mut self, idx: NodeIndex, state: ProcessState) {
        let old = self.node(idx).state;
        if old == state {
            return;
        }
        self.node_mut(idx).state = state;
        trace!(node = %self.path(idx), from = %old, to = %state, "state changed");

        if state.is_busy() && !old.is_busy() {
            self.publish(idx, NodeEvent::ProgressStarted);
            self.dispatch(idx, names::STARTED);
        }
        self.publish(idx, NodeEvent::StateChanged);
        if old.is_busy() && state.is_ready() {
            self.publish(idx, NodeEvent::ProgressFinished);
            self.dispatch(idx, names::FINISHED);
            self.after_run(idx);
        }
    }

    /// Drain the cascade, then run deferred work until nothing is left.
    pub fn settle(&mut self) {
        loop {
            while let Some(pending) = self.queue.pop_front() {
                self.on_child_event(pending);
            }
            let Some(deferred) = self.deferred.pop_front() else {
                break;
            };
            match deferred {
                Deferred::Run { node, event } => {
                    self.run(node, RunContext::new(event).triggered());
                }
                Deferred::Advance { list, position } => self.run_round_from(list, position),
                Deferred::Fire { trigger, event } => self.trigger_fired(trigger, event),
            }
        }
    }

    fn on_child_event(&mut self, pending: Pending) {
        let Pending {
            target,
            from,
            event,
        } = pending;
        if self.node(target).detached {
            return;
        }
        match &self.node(target).kind {
            NodeKind::List(_) => self.list_child_event(target, from, event),
            NodeKind::ValueModifier { .. } => self.modifier_child_event(target, from, event),
            _ => {}
        }
    }

    fn list_child_event(&mut self, list: NodeIndex, from: NodeIndex, event: NodeEvent) {
        match event {
            NodeEvent::ProgressStarted | NodeEvent::StateChanged => self.refresh_list_state(list),
            NodeEvent::ProgressChanged => {
                self.publish(list, NodeEvent::ProgressChanged);
            }
            NodeEvent::ProgressFinished => {
                self.advance_round(list, from);
                self.refresh_list_state(list);
            }
            NodeEvent::LogicalChanged
            | NodeEvent::LastNotNullLogicalChanged
            | NodeEvent::ResultChanged => self.reevaluate(list),
            NodeEvent::ExceptionRaised { origin } => {
                self.absorb_exception(list, from, origin);
                self.reevaluate(list);
            }
            NodeEvent::ExceptionCleared { origin } => {
                self.release_exception(list, origin);
                self.reevaluate(list);
            }
        }
    }

    fn absorb_exception(&mut self, target: NodeIndex, from: NodeIndex, origin: String) {
        let Some(fault) = self.node(from).exceptions.get(&origin).cloned() else {
            return;
        };
        let previous = self.node_mut(target).exceptions.insert(origin.clone(), fault.clone());
        if previous.as_ref() != Some(&fault) {
            self.publish(target, NodeEvent::ExceptionRaised { origin });
        }
    }

    fn release_exception(&mut self, target: NodeIndex, origin: String) {
        if self.node_mut(target).exceptions.remove(&origin).is_some() {
            self.publish(target, NodeEvent::ExceptionCleared { origin });
        }
    }

    /// Recompute a list's processing state from its children.
    pub(crate) fn refresh_list_state(&mut self, list: NodeIndex) {
        let node = self.node(list);
        let Some(spec) = node.list() else {
            return;
        };
        let round_active = spec.controlled && spec.round_active;
        let mut any_busy = false;
        let mut any_error = false;
        let mut all_none = true;
        for child in &node.children {
            let state = self.state(*child);
            any_busy |= state.is_busy();
            any_error |= state.contains(ProcessState::INTERNAL_ERROR);
            all_none &= state.is_none();
        }

        let state = if any_busy || round_active {
            ProcessState::WORKING
        } else if any_error {
            ProcessState::INTERNAL_ERROR
        } else if all_none {
            ProcessState::NONE
        } else {
            self.ready_state(list)
        };
        if state.is_ready() && !node.state.is_ready() && node.logical_state != LogicalState::UserAbort {
            self.node_mut(list).logical_state = LogicalState::Done;
        }
        self.set_state(list, state);
    }

    /// Re-run the threshold evaluator and publish a changed value.
    pub(crate) fn reevaluate(&mut self, list: NodeIndex) {
        let Some(spec) = self.node(list).list() else {
            return;
        };
        let volatile = spec.volatile;
        let threshold = spec.threshold;
        let break_with_result = spec.break_with_result;

        let mut tally = Tally::default();
        for child in self.node(list).children.clone() {
            let effective = self.node(self.effective(child));
            if effective.logical_state == LogicalState::Fault {
                tally.skip();
                continue;
            }
            let value = if volatile {
                effective.logical
            } else {
                effective.last_not_null
            };
            tally.push(value, self.payload(child));
        }

        let value = threshold.evaluate(&tally);
        let was = self.node(list).logical;
        self.set_logical(list, value);
        if value.is_known() {
            self.register_list_result(list, value);
        }

        if break_with_result && value.is_known() && value != was {
            for child in self.node(list).children.clone() {
                let child_node = self.node(child);
                if child_node.kind.is_connector() || !child_node.state.is_busy() {
                    continue;
                }
                debug!(list = %self.path(list), child = %self.path(child), "decided; breaking sibling");
                self.break_node(child, BreakReason::Result);
            }
        }
    }

    fn register_list_result(&mut self, list: NodeIndex, value: Logical) {
        let node = self.node(list);
        let mut result = crate::tree::NodeResult::new(
            node.id.clone(),
            value,
            value.as_bool().map(serde_json::Value::Bool),
        );
        result.state = node.state;
        result.logical_state = node.logical_state;
        self.results_of(list).register(result.clone());
        self.node_mut(list).result = Some(result);
    }

    /// Mirror the single operand of a value modifier, converting its payload.
    fn modifier_child_event(&mut self, modifier: NodeIndex, from: NodeIndex, event: NodeEvent) {
        let NodeKind::ValueModifier { kind } = self.node(modifier).kind else {
            return;
        };
        let child = self.node(from).clone();
        match event {
            NodeEvent::ProgressStarted | NodeEvent::StateChanged | NodeEvent::ProgressFinished => {
                self.node_mut(modifier).logical_state = child.logical_state;
                self.set_state(modifier, child.state);
            }
            NodeEvent::ProgressChanged => self.publish(modifier, NodeEvent::ProgressChanged),
            NodeEvent::LogicalChanged | NodeEvent::LastNotNullLogicalChanged => {
                self.node_mut(modifier).logical_state = child.logical_state;
                self.set_logical(modifier, child.logical);
                if child.last_not_null.is_known() {
                    self.set_last_not_null(modifier, child.last_not_null);
                }
            }
            NodeEvent::ResultChanged => {
                let id = self.node(modifier).id.clone();
                let converted = child.result.map(|mut result| {
                    result.id = id;
                    result.payload = result.payload.and_then(|p| convert(kind, &p));
                    result
                });
                if let Some(result) = &converted {
                    self.results_of(modifier).register(result.clone());
                }
                self.node_mut(modifier).result = converted;
                self.publish(modifier, NodeEvent::ResultChanged);
            }
            NodeEvent::ExceptionRaised { origin } => self.absorb_exception(modifier, from, origin),
            NodeEvent::ExceptionCleared { origin } => self.release_exception(modifier, origin),
        }
    }
}
