// src/tree/mod.rs

//! The logical task tree.
//!
//! Nodes live in an arena ([`Tree`]) and address each other by
//! [`NodeIndex`]. Children are owned through index lists; parent, job-root
//! and tree-root links are plain lookups.
//!
//! - [`builder`] materialises a tree from job definitions.
//! - [`evaluator`] and [`compare`] compute an internal node's value.
//! - [`cascade`] keeps ancestors consistent when a node changes.
//! - [`dispatch`] routes semantic events to triggers, workers and loggers.
//! - [`snapshot`] persists a tree and rebuilds read-only mirrors.
//!
//! The run state machine acting on a tree lives in `engine::scheduler`.

pub mod builder;
pub mod cascade;
pub mod compare;
pub mod dispatch;
pub mod evaluator;
pub mod event;
pub mod node;
pub mod result;
pub mod snapshot;

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::time::Duration;

use serde_json::Value;

use crate::engine::{CoreCommand, Notification};
use crate::trigger::{TriggerId, TriggerShell};
use crate::types::{Logical, LogicalState, ProcessState};

pub use builder::TreeBuilder;
pub use dispatch::{EventDispatcher, LoggerId, WorkerId, WorkersState};
pub use event::{NodeEvent, TreeEvent};
pub use node::{JobScope, ListSpec, LogicalNode, NodeIndex, NodeKind};
pub use result::{JobResults, NodeResult, ResultMap};

/// Bounds applied by the run scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Delay before a gated start is retried.
    pub retry_interval: Duration,
    /// Retries before a gated node is put into `INTERNAL_ERROR`.
    pub max_start_retries: u32,
    /// Delay between rounds of a looping controlled list.
    pub loop_delay: Duration,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(100),
            max_start_retries: 50,
            loop_delay: Duration::from_secs(1),
        }
    }
}

/// Work postponed until the current cascade settled.
#[derive(Debug, Clone)]
pub(crate) enum Deferred {
    Run { node: NodeIndex, event: TreeEvent },
    /// Continue a controlled round at `position`.
    Advance { list: NodeIndex, position: usize },
    Fire { trigger: TriggerId, event: TreeEvent },
}

/// Queued notification for one observer.
#[derive(Debug, Clone)]
pub(crate) struct Pending {
    pub target: NodeIndex,
    pub from: NodeIndex,
    pub event: NodeEvent,
}

/// Side effects accumulated while handling one runtime event.
#[derive(Debug, Default)]
pub struct Outbox {
    pub commands: Vec<CoreCommand>,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Default)]
pub struct Tree {
    nodes: Vec<LogicalNode>,
    root: NodeIndex,
    pub(crate) triggers: Vec<TriggerShell>,
    pub(crate) dispatcher: EventDispatcher,
    pub(crate) queue: VecDeque<Pending>,
    pub(crate) deferred: VecDeque<Deferred>,
    pub(crate) outbox: Outbox,
    pub(crate) limits: RunLimits,
    seq: u64,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_node(&mut self, node: LogicalNode) -> NodeIndex {
        self.nodes.push(node);
        NodeIndex(self.nodes.len() - 1)
    }

    pub(crate) fn set_root(&mut self, root: NodeIndex) {
        self.root = root;
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Panics on an index that did not come from this tree.
    pub fn node(&self, idx: NodeIndex) -> &LogicalNode {
        &self.nodes[idx.0]
    }

    pub(crate) fn node_mut(&mut self, idx: NodeIndex) -> &mut LogicalNode {
        &mut self.nodes[idx.0]
    }

    pub fn get(&self, idx: NodeIndex) -> Option<&LogicalNode> {
        self.nodes.get(idx.0).filter(|n| !n.detached)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All live node indices in creation order.
    pub fn indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.detached)
            .map(|(i, _)| NodeIndex(i))
    }

    pub fn limits(&self) -> RunLimits {
        self.limits
    }

    pub fn set_limits(&mut self, limits: RunLimits) {
        self.limits = limits;
    }

    pub fn triggers(&self) -> &[TriggerShell] {
        &self.triggers
    }

    pub fn trigger(&self, id: TriggerId) -> Option<&TriggerShell> {
        self.triggers.get(id.0)
    }

    pub(crate) fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    pub fn take_outbox(&mut self) -> Outbox {
        std::mem::take(&mut self.outbox)
    }

    /// Node a connector ultimately forwards to (the node itself otherwise).
    pub fn effective(&self, idx: NodeIndex) -> NodeIndex {
        let mut current = idx;
        for _ in 0..self.nodes.len() {
            match self.node(current).kind.connector_target() {
                Some(target) => current = target,
                None => return current,
            }
        }
        current
    }

    pub fn logical(&self, idx: NodeIndex) -> Logical {
        self.node(self.effective(idx)).logical
    }

    pub fn last_not_null(&self, idx: NodeIndex) -> Logical {
        self.node(self.effective(idx)).last_not_null
    }

    pub fn state(&self, idx: NodeIndex) -> ProcessState {
        self.node(self.effective(idx)).state
    }

    pub fn logical_state(&self, idx: NodeIndex) -> LogicalState {
        self.node(self.effective(idx)).logical_state
    }

    pub fn result(&self, idx: NodeIndex) -> Option<&NodeResult> {
        self.node(self.effective(idx)).result.as_ref()
    }

    /// Payload a comparison operator reads from this operand.
    ///
    /// Lists contribute their decided value as a boolean.
    pub fn payload(&self, idx: NodeIndex) -> Option<Value> {
        let node = self.node(self.effective(idx));
        match &node.kind {
            NodeKind::List(_) => node.last_not_null.as_bool().map(Value::Bool),
            _ => node.result.as_ref().and_then(|r| r.payload.clone()),
        }
    }

    /// Slash-joined chain of segments from the tree root.
    pub fn path(&self, idx: NodeIndex) -> String {
        let mut segments = Vec::new();
        let mut current = Some(idx);
        while let Some(i) = current {
            let node = self.node(i);
            segments.push(node.segment());
            current = node.parent;
        }
        segments.reverse();
        segments.join("/")
    }

    pub fn find_by_path(&self, path: &str) -> Option<NodeIndex> {
        self.indices().find(|i| self.path(*i) == path)
    }

    /// First live, non-connector node with this id.
    pub fn find_by_id(&self, id: &str) -> Option<NodeIndex> {
        self.indices().find(|i| {
            let n = self.node(*i);
            n.id == id && !n.kind.is_connector()
        })
    }

    /// Search the subtree of `job` for `id`.
    pub fn find_in_job(&self, job: NodeIndex, id: &str) -> Option<NodeIndex> {
        let mut stack = vec![job];
        while let Some(i) = stack.pop() {
            let node = self.node(i);
            if node.id == id && !node.kind.is_connector() {
                return Some(i);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    /// Job boundary instantiated for `name`.
    pub fn job(&self, name: &str) -> Option<NodeIndex> {
        self.indices().find(|i| {
            self.node(*i)
                .scope
                .as_ref()
                .is_some_and(|scope| scope.name == name)
        })
    }

    pub fn scope_of(&self, idx: NodeIndex) -> Option<&JobScope> {
        self.node(self.node(idx).root_job).scope.as_deref()
    }

    /// Result registry of the job `idx` belongs to.
    pub fn results_of(&self, idx: NodeIndex) -> JobResults {
        self.scope_of(idx)
            .map(|scope| scope.results.clone())
            .unwrap_or_default()
    }

    /// Job boundaries strictly above `idx`, nearest first.
    pub fn enclosing_jobs(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut jobs = Vec::new();
        let mut current = self.node(idx).parent;
        while let Some(i) = current {
            if self.node(i).is_job_boundary() {
                jobs.push(i);
            }
            current = self.node(i).parent;
        }
        jobs
    }

    /// Nothing running, waiting, or queued.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
            && self.deferred.is_empty()
            && self.indices().all(|i| {
                let n = self.node(i);
                !n.run.pending && !n.run.run_requested && !n.state.is_busy()
            })
    }

    /// Indented text rendering used by `--dry-run`.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self.root, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            let node = self.node(idx);
            let mut line = format!("{}{} [{}]", "  ".repeat(depth), node.segment(), node.node_type());
            match &node.kind {
                NodeKind::List(spec) => {
                    let _ = write!(line, " {}", spec.operator());
                    if spec.controlled {
                        line.push_str(" controlled");
                    }
                    if spec.looping {
                        line.push_str(" looping");
                    }
                }
                NodeKind::Checker { plugin, parameters, .. } => {
                    let _ = write!(line, " {plugin}({parameters})");
                }
                NodeKind::Constant { value } => {
                    let _ = write!(line, " = {value}");
                }
                NodeKind::ValueModifier { kind } => {
                    let _ = write!(line, " as {kind}");
                }
                NodeKind::NodeConnector { target } | NodeKind::JobConnector { target } => {
                    let _ = write!(line, " -> {}", self.path(*target));
                }
                NodeKind::Snapshot { path } => {
                    let _ = write!(line, " from {path}");
                }
                NodeKind::Mirror { .. } => {}
            }
            if let Some(trigger) = node.trigger.and_then(|t| self.trigger(t)) {
                let _ = write!(line, " trigger={}", trigger.name);
            }
            let _ = write!(
                line,
                " logical={} state={} ({})",
                node.last_not_null, node.state, node.logical_state
            );
            out.push_str(&line);
            out.push('\n');
            for child in node.children.iter().rev() {
                stack.push((*child, depth + 1));
            }
        }
        out
    }
}
