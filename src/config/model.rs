// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::job::{Job, JobProvider};
use crate::tree::RunLimits;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// root_job = "Main"
/// retry_interval = "100ms"
///
/// [job.Main]
/// logical = { op = "AND", operands = ["disk", "Db"] }
///
/// [job.Main.checkers.disk]
/// plugin = "command"
/// parameters = "test -d /var/lib"
///
/// [job.Db]
/// logical = "ping"
/// ```
///
/// This is the unvalidated shape; [`ConfigFile`] is obtained through
/// `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    /// Global behaviour config from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// All jobs from `[job.<name>]`, keyed by job name.
    #[serde(default)]
    pub job: BTreeMap<String, Job>,
}

/// `[config]` section. Durations are strings like `"250ms"` or `"2m"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSection {
    /// Job the tree is built from. Defaults to `Main` if present, otherwise
    /// the first job by name.
    #[serde(default)]
    pub root_job: Option<String>,

    #[serde(default = "default_retry_interval")]
    pub retry_interval: String,

    #[serde(default = "default_max_start_retries")]
    pub max_start_retries: u32,

    #[serde(default = "default_loop_delay")]
    pub loop_delay: String,

    /// Tree snapshot written when the runtime exits.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,

    /// Base directory for relative command manifest paths.
    #[serde(default)]
    pub plugin_dir: Option<PathBuf>,
}

fn default_retry_interval() -> String {
    "100ms".to_string()
}

fn default_max_start_retries() -> u32 {
    50
}

fn default_loop_delay() -> String {
    "1s".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            root_job: None,
            retry_interval: default_retry_interval(),
            max_start_retries: default_max_start_retries(),
            loop_delay: default_loop_delay(),
            snapshot_path: None,
            plugin_dir: None,
        }
    }
}

/// Validated global settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub root_job: String,
    pub limits: RunLimits,
    pub snapshot_path: Option<PathBuf>,
    pub plugin_dir: Option<PathBuf>,
}

/// A validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub settings: Settings,
    /// Jobs by name, each with its `name` filled in.
    pub jobs: BTreeMap<String, Job>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(settings: Settings, jobs: BTreeMap<String, Job>) -> Self {
        Self { settings, jobs }
    }

    pub fn root_job(&self) -> &str {
        &self.settings.root_job
    }

    /// Replace the root job (`--job`); the job must exist.
    pub fn with_root_job(mut self, name: &str) -> crate::errors::Result<Self> {
        if !self.jobs.contains_key(name) {
            return Err(crate::errors::LogicTreeError::JobNotFound(name.to_string()));
        }
        self.settings.root_job = name.to_string();
        Ok(self)
    }
}

impl JobProvider for ConfigFile {
    fn get_job(&self, name: &str) -> Option<Job> {
        self.jobs.get_job(name)
    }
}
