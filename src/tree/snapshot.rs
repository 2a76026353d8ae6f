// src/tree/snapshot.rs

//! Persisted tree documents.
//!
//! A [`TreeDocument`] is a JSON rendering of a sub-tree: ids, values, states,
//! results and exceptions per node. It is written on exit when a snapshot
//! path is configured, and read back by `Snapshot` nodes, which rebuild their
//! children as read-only mirrors every time they run.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fs::FileSystem;
use crate::plugin::CheckFault;
use crate::tree::{LogicalNode, NodeIndex, NodeKind, NodeResult, Tree};
use crate::types::{Logical, LogicalState, NodeType, Operator, ProcessState};

pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDocument {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub root: NodeRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_type: NodeType,
    pub id: String,
    pub name: String,
    pub path: String,
    pub logical: Logical,
    pub last_not_null: Logical,
    pub logical_state: LogicalState,
    pub state: ProcessState,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exceptions: BTreeMap<String, CheckFault>,
    #[serde(default)]
    pub result: Option<NodeResult>,
    #[serde(default)]
    pub operator: Option<Operator>,
    /// Path of the aliased node, for connectors.
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub children: Vec<NodeRecord>,
}

impl TreeDocument {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialising tree document")
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let document: TreeDocument =
            serde_json::from_str(text).context("parsing tree document")?;
        if document.version > DOCUMENT_VERSION {
            anyhow::bail!(
                "tree document version {} is newer than supported version {}",
                document.version,
                DOCUMENT_VERSION
            );
        }
        Ok(document)
    }

    /// Number of records in the document.
    pub fn len(&self) -> usize {
        fn count(record: &NodeRecord) -> usize {
            1 + record.children.iter().map(count).sum::<usize>()
        }
        count(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

pub fn save_document(fs: &dyn FileSystem, path: &Path, document: &TreeDocument) -> Result<()> {
    let json = document.to_json()?;
    fs.replace(path, json.as_bytes())
        .with_context(|| format!("writing tree snapshot {:?}", path))
}

pub fn load_document(fs: &dyn FileSystem, path: &Path) -> Result<TreeDocument> {
    let text = fs
        .read_to_string(path)
        .with_context(|| format!("reading tree snapshot {:?}", path))?;
    TreeDocument::from_json(&text).with_context(|| format!("loading tree snapshot {:?}", path))
}

impl Tree {
    /// Render the sub-tree rooted at `idx`.
    pub fn to_document(&self, idx: NodeIndex) -> TreeDocument {
        TreeDocument {
            version: DOCUMENT_VERSION,
            saved_at: Utc::now(),
            root: self.record(idx),
        }
    }

    fn record(&self, idx: NodeIndex) -> NodeRecord {
        let node = self.node(idx);
        let operator = match &node.kind {
            NodeKind::List(spec) => Some(spec.operator()),
            NodeKind::Mirror { operator, .. } => *operator,
            _ => None,
        };
        let target = node.kind.connector_target().map(|t| self.path(t));
        NodeRecord {
            node_type: node.node_type(),
            id: node.id.clone(),
            name: node.name.clone(),
            path: self.path(idx),
            logical: node.logical,
            last_not_null: node.last_not_null,
            logical_state: node.logical_state,
            state: node.state,
            last_run: node.last_run,
            exceptions: node.exceptions.clone(),
            result: node.result.clone(),
            operator,
            target,
            children: node.children.iter().map(|c| self.record(*c)).collect(),
        }
    }

    pub fn save_snapshot(&self, fs: &dyn FileSystem, path: &Path) -> Result<()> {
        save_document(fs, path, &self.to_document(self.root()))
    }

    /// Replace the children of a `Snapshot` node with mirrors of `document`.
    pub(crate) fn mount_snapshot(&mut self, idx: NodeIndex, document: &TreeDocument) {
        for child in std::mem::take(&mut self.node_mut(idx).children) {
            self.detach(child);
        }
        let children: Vec<NodeIndex> = document
            .root
            .children
            .iter()
            .map(|record| self.mirror(idx, record))
            .collect();
        debug!(node = %self.path(idx), mirrors = document.len() - 1, "snapshot mounted");
        self.node_mut(idx).children = children;
    }

    fn detach(&mut self, idx: NodeIndex) {
        for child in std::mem::take(&mut self.node_mut(idx).children) {
            self.detach(child);
        }
        self.node_mut(idx).detached = true;
    }

    fn mirror(&mut self, parent: NodeIndex, record: &NodeRecord) -> NodeIndex {
        let owner = self.node(parent);
        let (level, root_job, tree_root) = (owner.level + 1, owner.root_job, owner.tree_root);

        let mut node = LogicalNode::new(
            record.id.clone(),
            record.name.clone(),
            NodeKind::Mirror {
                node_type: record.node_type,
                operator: record.operator,
            },
        );
        node.level = level;
        node.parent = Some(parent);
        node.root_job = root_job;
        node.tree_root = tree_root;
        node.state = record.state;
        node.logical_state = record.logical_state;
        node.logical = record.logical;
        node.last_not_null = record.last_not_null;
        node.last_run = record.last_run;
        node.exceptions = record.exceptions.clone();
        node.result = record.result.clone();

        let idx = self.add_node(node);
        let children: Vec<NodeIndex> = record
            .children
            .iter()
            .map(|child| self.mirror(idx, child))
            .collect();
        self.node_mut(idx).children = children;
        idx
    }
}
