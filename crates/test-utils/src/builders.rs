#![allow(dead_code)]

use std::collections::BTreeMap;

use logictree::config::{ConfigFile, ConfigSection, RawConfigFile};
use logictree::job::{CheckerDef, Job, LoggerDef, SyntaxNode, TriggerDef, WorkerDef};

/// `A`
pub fn r(name: &str) -> SyntaxNode {
    SyntaxNode::reference(name)
}

pub fn and(operands: Vec<SyntaxNode>) -> SyntaxNode {
    SyntaxNode::op("AND", operands)
}

pub fn or(operands: Vec<SyntaxNode>) -> SyntaxNode {
    SyntaxNode::op("OR", operands)
}

pub fn not(operand: SyntaxNode) -> SyntaxNode {
    SyntaxNode::op("NOT", vec![operand])
}

pub fn op(name: &str, operands: Vec<SyntaxNode>) -> SyntaxNode {
    SyntaxNode::op(name, operands)
}

/// References to each of `names`.
pub fn refs(names: &[&str]) -> Vec<SyntaxNode> {
    names.iter().map(|n| r(n)).collect()
}

/// Builder for `Job`.
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(logical: SyntaxNode) -> Self {
        Self {
            job: Job {
                logical: Some(logical),
                ..Job::default()
            },
        }
    }

    pub fn snapshot(path: &str) -> Self {
        Self {
            job: Job {
                snapshot: Some(path.to_string()),
                ..Job::default()
            },
        }
    }

    pub fn checker(mut self, name: &str, plugin: &str, parameters: &str) -> Self {
        self.job.checkers.insert(
            name.to_string(),
            CheckerDef {
                plugin: plugin.to_string(),
                parameters: parameters.to_string(),
                ..CheckerDef::default()
            },
        );
        self
    }

    /// Several checkers driven by the test (`fake` plugin).
    pub fn fakes(mut self, names: &[&str]) -> Self {
        for name in names {
            self = self.checker(name, "fake", "");
        }
        self
    }

    /// Attach a trigger or logger to an existing checker.
    pub fn checker_trigger(mut self, checker: &str, trigger: &str) -> Self {
        if let Some(def) = self.job.checkers.get_mut(checker) {
            def.trigger = Some(trigger.to_string());
        }
        self
    }

    pub fn checker_logger(mut self, checker: &str, logger: &str) -> Self {
        if let Some(def) = self.job.checkers.get_mut(checker) {
            def.logger = Some(logger.to_string());
        }
        self
    }

    pub fn trigger(mut self, name: &str, plugin: &str, parameters: &str) -> Self {
        self.job.triggers.insert(
            name.to_string(),
            TriggerDef {
                plugin: Some(plugin.to_string()),
                parameters: parameters.to_string(),
                ..TriggerDef::default()
            },
        );
        self
    }

    pub fn event_trigger(mut self, name: &str, events: &[&str], reference: &str) -> Self {
        self.job.triggers.insert(
            name.to_string(),
            TriggerDef {
                events: events.iter().map(|e| e.to_string()).collect(),
                reference: Some(reference.to_string()),
                ..TriggerDef::default()
            },
        );
        self
    }

    pub fn logger(mut self, name: &str, plugin: &str, parameters: &str) -> Self {
        self.job.loggers.insert(
            name.to_string(),
            LoggerDef {
                plugin: plugin.to_string(),
                parameters: parameters.to_string(),
            },
        );
        self
    }

    pub fn worker(mut self, event: &str, node: Option<&str>, plugin: &str, parameters: &str) -> Self {
        self.job.workers.push(WorkerDef {
            event: event.to_string(),
            node: node.map(str::to_string),
            plugin: plugin.to_string(),
            parameters: parameters.to_string(),
            trigger: None,
        });
        self
    }

    /// Give the last added worker a trigger.
    pub fn worker_trigger(mut self, trigger: &str) -> Self {
        if let Some(worker) = self.job.workers.last_mut() {
            worker.trigger = Some(trigger.to_string());
        }
        self
    }

    pub fn job_trigger(mut self, trigger: &str) -> Self {
        self.job.trigger = Some(trigger.to_string());
        self
    }

    pub fn job_logger(mut self, logger: &str) -> Self {
        self.job.logger = Some(logger.to_string());
        self
    }

    pub fn controlled(mut self) -> Self {
        self.job.controlled = true;
        self
    }

    pub fn looping(mut self) -> Self {
        self.job.controlled = true;
        self.job.looping = true;
        self
    }

    pub fn volatile(mut self) -> Self {
        self.job.volatile = true;
        self
    }

    pub fn break_with_result(mut self) -> Self {
        self.job.break_with_result = true;
        self
    }

    pub fn init_nodes(mut self) -> Self {
        self.job.init_nodes = true;
        self
    }

    pub fn lock(mut self, name: &str) -> Self {
        self.job.lock_name = Some(name.to_string());
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

/// Builder for a job map.
#[derive(Default)]
pub struct JobsBuilder {
    jobs: BTreeMap<String, Job>,
}

impl JobsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_job(mut self, name: &str, job: JobBuilder) -> Self {
        let mut job = job.build();
        job.name = name.to_string();
        self.jobs.insert(name.to_string(), job);
        self
    }

    pub fn build(self) -> BTreeMap<String, Job> {
        self.jobs
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                job: BTreeMap::new(),
            },
        }
    }

    pub fn with_job(mut self, name: &str, job: JobBuilder) -> Self {
        self.config.job.insert(name.to_string(), job.build());
        self
    }

    pub fn root_job(mut self, name: &str) -> Self {
        self.config.config.root_job = Some(name.to_string());
        self
    }

    pub fn retry_interval(mut self, value: &str) -> Self {
        self.config.config.retry_interval = value.to_string();
        self
    }

    pub fn max_start_retries(mut self, value: u32) -> Self {
        self.config.config.max_start_retries = value;
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
