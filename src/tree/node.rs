// src/tree/node.rs

//! Node records stored in the tree arena.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::plugin::{CheckFault, Checker};
use crate::tree::dispatch::LoggerId;
use crate::tree::evaluator::Threshold;
use crate::tree::result::{JobResults, NodeResult, ResultMap};
use crate::tree::event::TreeEvent;
use crate::trigger::TriggerId;
use crate::types::{Logical, LogicalState, NodeType, Operator, ProcessState, ValueKind};

/// Stable index of a node in the arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub usize);

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Operator and counting rules of an internal node.
#[derive(Debug, Clone)]
pub struct ListSpec {
    pub threshold: Threshold,
    /// Count live `logical` instead of `last_not_null`.
    pub volatile: bool,
    /// Cancel still-running children once decided.
    pub break_with_result: bool,
    /// Start children one after another.
    pub controlled: bool,
    /// Start a new controlled round after the last child finished.
    pub looping: bool,
    /// Controlled round bookkeeping: child currently awaited.
    pub cursor: usize,
    pub round_active: bool,
}

impl ListSpec {
    pub fn new(operator: Operator, operands: usize) -> Self {
        Self {
            threshold: Threshold::compile(operator, operands),
            volatile: false,
            break_with_result: false,
            controlled: false,
            looping: false,
            cursor: 0,
            round_active: false,
        }
    }

    pub fn operator(&self) -> Operator {
        self.threshold.operator
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Constant {
        value: Value,
    },
    Checker {
        plugin: String,
        checker: Arc<dyn Checker>,
        parameters: String,
    },
    /// `NodeList`, or `JobList` when the node carries a [`JobScope`].
    List(ListSpec),
    NodeConnector {
        target: NodeIndex,
    },
    JobConnector {
        target: NodeIndex,
    },
    ValueModifier {
        kind: ValueKind,
    },
    Snapshot {
        path: String,
    },
    /// Read-only node rebuilt from a persisted document.
    Mirror {
        node_type: NodeType,
        operator: Option<Operator>,
    },
}

impl NodeKind {
    pub fn connector_target(&self) -> Option<NodeIndex> {
        match self {
            NodeKind::NodeConnector { target } | NodeKind::JobConnector { target } => Some(*target),
            _ => None,
        }
    }

    pub fn is_connector(&self) -> bool {
        self.connector_target().is_some()
    }
}

/// Namespaces owned by a job boundary.
#[derive(Debug, Clone, Default)]
pub struct JobScope {
    pub name: String,
    pub triggers: BTreeMap<String, TriggerId>,
    pub loggers: BTreeMap<String, LoggerId>,
    pub results: JobResults,
    pub lock: Option<String>,
    /// Per-job counter for generated ids (`AND#1`, `Const#2`, ...).
    pub next_id: usize,
}

impl JobScope {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn generate_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}#{}", self.next_id)
    }
}

/// Per-node run bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    /// Bumped on every start, break and reset; completions carrying an older
    /// value are stale.
    pub generation: u64,
    /// A check (or snapshot load) was issued and has not come back.
    pub pending: bool,
    /// Another run was requested while this one was busy or gated.
    pub run_requested: bool,
    pub retries: u32,
    /// Event of the current or requested run.
    pub event: Option<TreeEvent>,
}

#[derive(Debug, Clone)]
pub struct LogicalNode {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub level: usize,

    pub parent: Option<NodeIndex>,
    /// Nearest enclosing job boundary (itself for a job boundary).
    pub root_job: NodeIndex,
    pub tree_root: NodeIndex,
    pub children: Vec<NodeIndex>,
    /// Connectors forwarding to this node.
    pub aliases: Vec<NodeIndex>,

    pub state: ProcessState,
    pub logical_state: LogicalState,
    pub logical: Logical,
    pub last_not_null: Logical,

    pub trigger: Option<TriggerId>,
    pub logger: Option<LoggerId>,
    pub init_nodes: bool,
    pub lock: Option<String>,

    pub environment: ResultMap,
    pub result: Option<NodeResult>,
    /// Origin node id -> last fault.
    pub exceptions: BTreeMap<String, CheckFault>,
    pub scope: Option<Box<JobScope>>,

    pub run: RunControl,
    pub last_run: Option<DateTime<Utc>>,
    /// Removed from the tree (replaced snapshot mirror); never addressed again.
    pub detached: bool,
}

impl LogicalNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            level: 0,
            parent: None,
            root_job: NodeIndex(0),
            tree_root: NodeIndex(0),
            children: Vec::new(),
            aliases: Vec::new(),
            state: ProcessState::NONE,
            logical_state: LogicalState::None,
            logical: Logical::Unknown,
            last_not_null: Logical::Unknown,
            trigger: None,
            logger: None,
            init_nodes: false,
            lock: None,
            environment: ResultMap::new(),
            result: None,
            exceptions: BTreeMap::new(),
            scope: None,
            run: RunControl::default(),
            last_run: None,
            detached: false,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match &self.kind {
            NodeKind::Constant { .. } => NodeType::Constant,
            NodeKind::Checker { .. } => NodeType::Checker,
            NodeKind::List(_) if self.scope.is_some() => NodeType::JobList,
            NodeKind::List(_) => NodeType::NodeList,
            NodeKind::NodeConnector { .. } => NodeType::NodeConnector,
            NodeKind::JobConnector { .. } => NodeType::JobConnector,
            NodeKind::ValueModifier { .. } => NodeType::ValueModifier,
            NodeKind::Snapshot { .. } => NodeType::Snapshot,
            NodeKind::Mirror { node_type, .. } => *node_type,
        }
    }

    pub fn is_job_boundary(&self) -> bool {
        self.scope.is_some()
    }

    pub fn list(&self) -> Option<&ListSpec> {
        match &self.kind {
            NodeKind::List(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn list_mut(&mut self) -> Option<&mut ListSpec> {
        match &mut self.kind {
            NodeKind::List(spec) => Some(spec),
            _ => None,
        }
    }

    /// Path segment: `name:id`, or just `id` when both agree.
    pub fn segment(&self) -> String {
        if self.name == self.id || self.name.is_empty() {
            self.id.clone()
        } else {
            format!("{}:{}", self.name, self.id)
        }
    }
}
