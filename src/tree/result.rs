// src/tree/result.rs

//! Outcome records produced by leaves and the per-job result registry.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Logical, LogicalState, ProcessState};

/// Outcome of one run of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub id: String,
    pub logical: Logical,
    pub state: ProcessState,
    pub logical_state: LogicalState,
    /// Return payload of the check; compared by comparison operators.
    #[serde(default)]
    pub payload: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl NodeResult {
    pub fn new(id: impl Into<String>, logical: Logical, payload: Option<Value>) -> Self {
        Self {
            id: id.into(),
            logical,
            state: ProcessState::FINISHED,
            logical_state: LogicalState::Done,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Results keyed by node id.
pub type ResultMap = BTreeMap<String, NodeResult>;

/// Thread-safe id -> result registry owned by a job boundary.
///
/// Later-run siblings read earlier outputs from here; every access holds the
/// lock only for the copy.
#[derive(Debug, Clone, Default)]
pub struct JobResults {
    inner: Arc<Mutex<ResultMap>>,
}

impl JobResults {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ResultMap> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the result registered under `result.id`.
    pub fn register(&self, result: NodeResult) {
        self.lock().insert(result.id.clone(), result);
    }

    pub fn remove(&self, id: &str) {
        self.lock().remove(id);
    }

    pub fn get(&self, id: &str) -> Option<NodeResult> {
        self.lock().get(id).cloned()
    }

    pub fn snapshot(&self) -> ResultMap {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
