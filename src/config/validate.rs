// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, ConfigSection, RawConfigFile, Settings};
use crate::errors::{LogicTreeError, Result};
use crate::job::Job;
use crate::tree::RunLimits;
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = LogicTreeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let mut jobs = raw.job;
        for (name, job) in jobs.iter_mut() {
            job.name = name.clone();
        }

        ensure_has_jobs(&jobs)?;
        let settings = validate_global_config(&raw.config, &jobs)?;
        for job in jobs.values() {
            validate_job(job)?;
        }
        validate_job_graph(&jobs)?;

        Ok(ConfigFile::new_unchecked(settings, jobs))
    }
}

fn config_error(message: String) -> LogicTreeError {
    LogicTreeError::ConfigError(message)
}

fn ensure_has_jobs(jobs: &BTreeMap<String, Job>) -> Result<()> {
    if jobs.is_empty() {
        return Err(config_error(
            "config must contain at least one [job.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| config_error(format!("[config].{field}: {e}")))
}

fn validate_global_config(cfg: &ConfigSection, jobs: &BTreeMap<String, Job>) -> Result<Settings> {
    let retry_interval = duration_field("retry_interval", &cfg.retry_interval)?;
    if retry_interval.is_zero() {
        return Err(config_error(
            "[config].retry_interval must be greater than zero".to_string(),
        ));
    }
    let loop_delay = duration_field("loop_delay", &cfg.loop_delay)?;

    let root_job = match &cfg.root_job {
        Some(name) if jobs.contains_key(name) => name.clone(),
        Some(name) => return Err(LogicTreeError::JobNotFound(name.clone())),
        None if jobs.contains_key("Main") => "Main".to_string(),
        None => jobs
            .keys()
            .next()
            .cloned()
            .ok_or_else(|| config_error("no job to use as root".to_string()))?,
    };

    Ok(Settings {
        root_job,
        limits: RunLimits {
            retry_interval,
            max_start_retries: cfg.max_start_retries,
            loop_delay,
        },
        snapshot_path: cfg.snapshot_path.clone(),
        plugin_dir: cfg.plugin_dir.clone(),
    })
}

fn validate_job(job: &Job) -> Result<()> {
    let name = &job.name;
    match (&job.logical, &job.snapshot) {
        (Some(_), None) | (None, Some(_)) => {}
        (Some(_), Some(_)) => {
            return Err(config_error(format!(
                "job '{name}' sets both 'logical' and 'snapshot'"
            )));
        }
        (None, None) => {
            return Err(config_error(format!(
                "job '{name}' needs either 'logical' or 'snapshot'"
            )));
        }
    }

    if job.looping && !job.controlled {
        return Err(config_error(format!(
            "job '{name}' is looping but not controlled"
        )));
    }

    for (checker, def) in &job.checkers {
        if def.plugin.trim().is_empty() {
            return Err(config_error(format!(
                "checker '{checker}' in job '{name}' has an empty 'plugin'"
            )));
        }
    }

    for (trigger, def) in &job.triggers {
        match (def.is_event_sourced(), &def.plugin, &def.reference) {
            (true, None, Some(_)) | (false, Some(_), None) => {}
            (true, Some(_), _) => {
                return Err(config_error(format!(
                    "trigger '{trigger}' in job '{name}' sets both 'plugin' and 'events'"
                )));
            }
            (true, None, None) => {
                return Err(config_error(format!(
                    "trigger '{trigger}' in job '{name}' has 'events' but no 'reference'"
                )));
            }
            (false, _, Some(_)) => {
                return Err(config_error(format!(
                    "trigger '{trigger}' in job '{name}' has a 'reference' but no 'events'"
                )));
            }
            (false, None, None) => {
                return Err(config_error(format!(
                    "trigger '{trigger}' in job '{name}' needs either 'plugin' or 'events'"
                )));
            }
        }
    }

    for (i, worker) in job.workers.iter().enumerate() {
        if worker.event.trim().is_empty() {
            return Err(config_error(format!(
                "worker #{i} in job '{name}' has an empty 'event'"
            )));
        }
        if worker.plugin.trim().is_empty() {
            return Err(config_error(format!(
                "worker #{i} in job '{name}' has an empty 'plugin'"
            )));
        }
    }

    Ok(())
}

/// Sub-job references must not form a cycle.
///
/// Edge direction: job -> referenced sub-job. For
///
/// ```toml
/// [job.A]
/// logical = { op = "AND", operands = ["B", "x"] }
/// ```
///
/// we add edge A -> B when `B` is a job rather than a checker of `A`.
fn validate_job_graph(jobs: &BTreeMap<String, Job>) -> Result<()> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in jobs.keys() {
        graph.add_node(name.as_str());
    }

    for (name, job) in jobs {
        for reference in job.foreign_references() {
            if let Some((sub, _)) = jobs.get_key_value(&reference) {
                graph.add_edge(name.as_str(), sub.as_str(), ());
            }
        }
    }

    // A topological sort fails if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(LogicTreeError::JobCycle(format!(
            "cycle in job references involving job '{}'",
            cycle.node_id()
        ))),
    }
}
