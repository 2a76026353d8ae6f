// src/tree/event.rs

//! Events flowing through the tree.
//!
//! Two layers exist:
//! - [`NodeEvent`]: structural change notifications a node publishes to its
//!   observers (its parent and the parents of its aliases).
//! - [`TreeEvent`]: the record handed to triggers, workers and loggers when a
//!   node dispatches a semantic event name (see [`names`]).

use serde::{Deserialize, Serialize};

use crate::tree::result::ResultMap;
use crate::types::{Logical, LogicalState};

/// Semantic event names dispatched to triggers, workers and loggers.
pub mod names {
    pub const STARTED: &str = "Started";
    pub const BREAKED: &str = "Breaked";
    pub const FINISHED: &str = "Finished";
    pub const PROGRESS_CHANGED: &str = "ProgressChanged";
    pub const LOGICAL_CHANGED: &str = "LogicalChanged";
    pub const LAST_NOT_NULL_LOGICAL_CHANGED: &str = "LastNotNullLogicalChanged";
    pub const LAST_NOT_NULL_LOGICAL_TO_TRUE: &str = "LastNotNullLogicalToTrue";
    pub const LAST_NOT_NULL_LOGICAL_TO_FALSE: &str = "LastNotNullLogicalToFalse";
    pub const EXCEPTION: &str = "Exception";
    pub const EXCEPTION_CLEARED: &str = "ExceptionCleared";
    pub const RESET: &str = "Reset";

    pub const ANY_PREFIX: &str = "Any";

    /// Name re-dispatched to enclosing job boundaries.
    pub fn any(name: &str) -> String {
        format!("{ANY_PREFIX}{name}")
    }

    pub fn is_any(name: &str) -> bool {
        name.starts_with(ANY_PREFIX)
    }

    /// Event whose dispatch terminates workers started for `name`.
    pub fn complement(name: &str) -> Option<&'static str> {
        match name {
            LAST_NOT_NULL_LOGICAL_TO_TRUE => Some(LAST_NOT_NULL_LOGICAL_TO_FALSE),
            LAST_NOT_NULL_LOGICAL_TO_FALSE => Some(LAST_NOT_NULL_LOGICAL_TO_TRUE),
            EXCEPTION => Some(EXCEPTION_CLEARED),
            EXCEPTION_CLEARED => Some(EXCEPTION),
            STARTED => Some(FINISHED),
            FINISHED => Some(STARTED),
            _ => None,
        }
    }
}

/// Change notification published by a node to its observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    ProgressStarted,
    ProgressChanged,
    ProgressFinished,
    StateChanged,
    LogicalChanged,
    LastNotNullLogicalChanged,
    ResultChanged,
    /// `origin` is the id of the node whose check raised.
    ExceptionRaised { origin: String },
    ExceptionCleared { origin: String },
}

/// Snapshot handed to triggers, workers and loggers.
///
/// Built fresh for every dispatch and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEvent {
    /// Monotonic per-tree sequence number.
    pub seq: u64,
    pub name: String,
    /// Id of the node that emitted the event originally.
    pub source: String,
    /// Id of the node re-publishing it (differs for `Any*` names).
    pub sender: String,
    pub path: String,
    pub logical: Logical,
    pub logical_state: LogicalState,
    #[serde(default)]
    pub results: ResultMap,
    #[serde(default)]
    pub environment: ResultMap,
}

impl TreeEvent {
    /// Event used for runs that were not caused by anything in the tree.
    pub fn external(name: &str, sender: &str, path: &str) -> Self {
        Self {
            seq: 0,
            name: name.to_string(),
            source: sender.to_string(),
            sender: sender.to_string(),
            path: path.to_string(),
            logical: Logical::Unknown,
            logical_state: LogicalState::None,
            results: ResultMap::new(),
            environment: ResultMap::new(),
        }
    }
}
