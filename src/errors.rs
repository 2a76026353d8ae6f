// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Only configuration faults surface through [`LogicTreeError`]. Faults raised
//! by a check while the tree is running are recorded on the node instead (see
//! [`crate::plugin::CheckFault`]).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogicTreeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Cycle detected in job references: {0}")]
    JobCycle(String),

    #[error("Unresolved reference '{name}' in job '{job}'")]
    UnresolvedReference { job: String, name: String },

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Plugin load error: {0}")]
    PluginLoad(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, LogicTreeError>;
