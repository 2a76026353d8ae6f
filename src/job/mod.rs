// src/job/mod.rs

//! Job definitions: the unit of configuration a `JobList` is built from.
//!
//! A [`Job`] names its logical expression plus the checker, trigger, logger
//! and worker definitions its nodes may refer to. Sub-jobs are pulled in by
//! name through a [`JobProvider`].

pub mod syntax;

use std::collections::BTreeMap;

use serde::Deserialize;

pub use syntax::SyntaxNode;

/// `[job.<name>.checkers.<checker>]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckerDef {
    /// Built-in plugin name or path to a command manifest.
    pub plugin: String,
    #[serde(default)]
    pub parameters: String,
    #[serde(default)]
    pub trigger: Option<String>,
    #[serde(default)]
    pub logger: Option<String>,
    /// Reset this leaf before each of its runs.
    #[serde(default)]
    pub init_nodes: bool,
}

/// `[job.<name>.triggers.<trigger>]`
///
/// Either plugin-backed (`plugin` + `parameters`) or event-sourced
/// (`events` + `reference`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerDef {
    #[serde(default)]
    pub plugin: Option<String>,
    #[serde(default)]
    pub parameters: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

impl TriggerDef {
    pub fn is_event_sourced(&self) -> bool {
        !self.events.is_empty()
    }
}

/// `[job.<name>.loggers.<logger>]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggerDef {
    pub plugin: String,
    #[serde(default)]
    pub parameters: String,
}

/// `[[job.<name>.workers]]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkerDef {
    /// Event name the worker reacts to.
    pub event: String,
    /// Id of the sending node; defaults to the job itself.
    #[serde(default)]
    pub node: Option<String>,
    pub plugin: String,
    #[serde(default)]
    pub parameters: String,
    #[serde(default)]
    pub trigger: Option<String>,
}

/// Definition of a job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Job {
    /// Filled in from the table key when loaded from config.
    #[serde(skip)]
    pub name: String,

    #[serde(default)]
    pub logical: Option<SyntaxNode>,

    /// Path of a persisted tree document; makes this job a read-only mirror.
    #[serde(default)]
    pub snapshot: Option<String>,

    #[serde(default)]
    pub trigger: Option<String>,

    #[serde(default)]
    pub logger: Option<String>,

    #[serde(default)]
    pub break_with_result: bool,

    #[serde(default)]
    pub controlled: bool,

    #[serde(default)]
    pub looping: bool,

    #[serde(default)]
    pub volatile: bool,

    #[serde(default)]
    pub init_nodes: bool,

    #[serde(default)]
    pub thread_locked: bool,

    #[serde(default)]
    pub lock_name: Option<String>,

    #[serde(default)]
    pub checkers: BTreeMap<String, CheckerDef>,

    #[serde(default)]
    pub triggers: BTreeMap<String, TriggerDef>,

    #[serde(default)]
    pub loggers: BTreeMap<String, LoggerDef>,

    #[serde(default)]
    pub workers: Vec<WorkerDef>,
}

impl Job {
    /// Lock the job's checks serialise on, if any.
    pub fn effective_lock(&self) -> Option<String> {
        match (&self.lock_name, self.thread_locked) {
            (Some(name), _) => Some(name.clone()),
            (None, true) => Some(self.name.clone()),
            (None, false) => None,
        }
    }

    /// Names referenced by the expression that are not checkers of this job.
    ///
    /// These are candidates for sub-jobs (or checkers of an enclosing job).
    pub fn foreign_references(&self) -> Vec<String> {
        let Some(logical) = &self.logical else {
            return Vec::new();
        };
        let mut names: Vec<String> = logical
            .references()
            .into_iter()
            .filter(|name| !self.checkers.contains_key(*name))
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Source of job definitions, used recursively to resolve sub-jobs by name.
pub trait JobProvider {
    fn get_job(&self, name: &str) -> Option<Job>;
}

impl JobProvider for BTreeMap<String, Job> {
    fn get_job(&self, name: &str) -> Option<Job> {
        self.get(name).map(|job| {
            let mut job = job.clone();
            job.name = name.to_string();
            job
        })
    }
}
