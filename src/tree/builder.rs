// src/tree/builder.rs

//! Materialise a [`Tree`] from job definitions.
//!
//! The root job becomes a `JobList`. Names in an expression resolve to a
//! checker of the current job, then of an enclosing job, then to another
//! job. Repeated references collapse into one executed node plus
//! connectors:
//!
//! - a checker referenced twice becomes one leaf and a `NodeConnector`
//! - a job referenced twice becomes one `JobList` and a `JobConnector`
//!
//! Triggers and loggers resolve the same way, job-local first. Event-sourced
//! trigger references and worker senders are bound in a second pass, once
//! every node exists.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::{debug, info};

use crate::errors::{LogicTreeError, Result};
use crate::job::{Job, JobProvider, SyntaxNode, WorkerDef};
use crate::plugin::PluginRegistry;
use crate::tree::dispatch::{LoggerBinding, LoggerId, WorkerBinding};
use crate::tree::{JobScope, ListSpec, LogicalNode, NodeIndex, NodeKind, Tree};
use crate::trigger::{TriggerId, TriggerShell, TriggerSource};
use crate::types::{Operator, ValueKind};

/// Job being built, innermost last.
#[derive(Debug)]
struct Frame {
    job: Job,
    index: NodeIndex,
    /// Logger inherited by nodes that do not name their own.
    logger: Option<LoggerId>,
    lock: Option<String>,
}

#[derive(Debug)]
struct PendingReference {
    trigger: TriggerId,
    job_name: String,
    job: NodeIndex,
    reference: String,
}

#[derive(Debug)]
struct PendingWorker {
    def: WorkerDef,
    job_name: String,
    job: NodeIndex,
    trigger: Option<TriggerId>,
}

pub struct TreeBuilder<'a> {
    jobs: &'a dyn JobProvider,
    registry: &'a PluginRegistry,
    tree: Tree,
    stack: Vec<Frame>,
    built_jobs: BTreeMap<String, NodeIndex>,
    built_checkers: BTreeMap<(NodeIndex, String), NodeIndex>,
    references: Vec<PendingReference>,
    workers: Vec<PendingWorker>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(jobs: &'a dyn JobProvider, registry: &'a PluginRegistry) -> Self {
        Self {
            jobs,
            registry,
            tree: Tree::new(),
            stack: Vec::new(),
            built_jobs: BTreeMap::new(),
            built_checkers: BTreeMap::new(),
            references: Vec::new(),
            workers: Vec::new(),
        }
    }

    pub fn build(mut self, root_job: &str) -> Result<Tree> {
        let root = self.build_job(root_job, None)?;
        self.tree.set_root(root);

        self.resolve_event_triggers()?;
        self.bind_workers()?;

        let all: Vec<NodeIndex> = self.tree.indices().collect();
        for idx in all {
            self.tree.node_mut(idx).tree_root = root;
        }

        info!(
            root_job,
            nodes = self.tree.len(),
            jobs = self.built_jobs.len(),
            triggers = self.tree.triggers.len(),
            workers = self.tree.dispatcher.workers.len(),
            "tree built"
        );
        Ok(self.tree)
    }

    fn frame(&self) -> &Frame {
        // build_job pushes a frame before building anything below a job
        &self.stack[self.stack.len() - 1]
    }

    fn add(&mut self, mut node: LogicalNode, parent: Option<NodeIndex>) -> NodeIndex {
        if let Some(parent) = parent {
            node.level = self.tree.node(parent).level + 1;
        }
        node.parent = parent;
        if let Some(frame) = self.stack.last() {
            node.root_job = frame.index;
            if node.logger.is_none() {
                node.logger = frame.logger;
            }
        }
        let idx = self.tree.add_node(node);
        if let Some(parent) = parent {
            self.tree.node_mut(parent).children.push(idx);
        }
        idx
    }

    fn generate_id(&mut self, prefix: &str) -> String {
        let job = self.frame().index;
        match self.tree.node_mut(job).scope.as_mut() {
            Some(scope) => scope.generate_id(prefix),
            None => prefix.to_string(),
        }
    }

    fn build_job(&mut self, name: &str, parent: Option<NodeIndex>) -> Result<NodeIndex> {
        if self.stack.iter().any(|frame| frame.job.name == name) {
            let mut chain: Vec<&str> = self.stack.iter().map(|f| f.job.name.as_str()).collect();
            chain.push(name);
            return Err(LogicTreeError::JobCycle(chain.join(" -> ")));
        }

        if let Some(&target) = self.built_jobs.get(name) {
            let id = self.generate_id(name);
            debug!(job = name, %id, "job already built; adding connector");
            let idx = self.add(
                LogicalNode::new(id, name, NodeKind::JobConnector { target }),
                parent,
            );
            self.tree.node_mut(target).aliases.push(idx);
            return Ok(idx);
        }

        let job = self
            .jobs
            .get_job(name)
            .ok_or_else(|| LogicTreeError::JobNotFound(name.to_string()))?;

        let kind = match (&job.logical, &job.snapshot) {
            (Some(logical), None) => NodeKind::List(self.job_spec(&job, logical)?),
            (None, Some(path)) => NodeKind::Snapshot { path: path.clone() },
            (Some(_), Some(_)) => {
                return Err(LogicTreeError::ConfigError(format!(
                    "job '{name}' declares both 'logical' and 'snapshot'"
                )));
            }
            (None, None) => {
                return Err(LogicTreeError::ConfigError(format!(
                    "job '{name}' declares neither 'logical' nor 'snapshot'"
                )));
            }
        };

        let lock = job
            .effective_lock()
            .or_else(|| self.stack.last().and_then(|f| f.lock.clone()));
        let mut scope = JobScope::new(name);
        scope.lock = lock.clone();

        let mut node = LogicalNode::new(name, name, kind);
        node.init_nodes = job.init_nodes;
        node.scope = Some(Box::new(scope));
        let idx = self.add(node, parent);
        self.tree.node_mut(idx).root_job = idx;
        self.built_jobs.insert(name.to_string(), idx);

        let inherited_logger = self.stack.last().and_then(|f| f.logger);
        self.stack.push(Frame {
            job: job.clone(),
            index: idx,
            logger: inherited_logger,
            lock,
        });

        let result = self.populate_job(idx, &job);
        self.stack.pop();
        result?;

        info!(job = name, index = %idx, "job built");
        Ok(idx)
    }

    fn populate_job(&mut self, idx: NodeIndex, job: &Job) -> Result<()> {
        self.declare_triggers(idx, job)?;
        self.declare_loggers(idx, job)?;

        if let Some(logger) = &job.logger {
            let logger = self.resolve_logger(logger)?;
            if let Some(frame) = self.stack.last_mut() {
                frame.logger = Some(logger);
            }
        }
        self.tree.node_mut(idx).logger = self.frame().logger;

        if let Some(trigger) = &job.trigger {
            let trigger = self.resolve_trigger(trigger)?;
            self.tree.triggers[trigger.0].register_trigger_it();
            self.tree.node_mut(idx).trigger = Some(trigger);
        }

        if let Some(logical) = &job.logical {
            match logical {
                SyntaxNode::Operator { operands, .. } => {
                    for operand in operands {
                        self.build_expression(operand, idx)?;
                    }
                }
                single => {
                    self.build_expression(single, idx)?;
                }
            }
        }

        for def in &job.workers {
            let trigger = match &def.trigger {
                Some(name) => {
                    let trigger = self.resolve_trigger(name)?;
                    self.tree.triggers[trigger.0].register_trigger_it();
                    Some(trigger)
                }
                None => None,
            };
            self.workers.push(PendingWorker {
                def: def.clone(),
                job_name: job.name.clone(),
                job: idx,
                trigger,
            });
        }
        Ok(())
    }

    /// List rules of the job boundary. A top-level operator is flattened into
    /// the job list; anything else is wrapped in `IS`.
    fn job_spec(&self, job: &Job, logical: &SyntaxNode) -> Result<ListSpec> {
        let (operator, operands) = match logical {
            SyntaxNode::Operator { op, operands } => (parse_operator(op, operands.len())?, operands.len()),
            _ => (Operator::Is, 1),
        };
        let mut spec = self.list_spec(job, operator, operands);
        spec.looping = job.looping;
        if job.looping && !job.controlled {
            return Err(LogicTreeError::ConfigError(format!(
                "job '{}' is looping but not controlled",
                job.name
            )));
        }
        Ok(spec)
    }

    fn list_spec(&self, job: &Job, operator: Operator, operands: usize) -> ListSpec {
        let mut spec = ListSpec::new(operator, operands);
        spec.volatile = job.volatile;
        spec.break_with_result = job.break_with_result;
        spec.controlled = job.controlled;
        spec
    }

    fn declare_triggers(&mut self, idx: NodeIndex, job: &Job) -> Result<()> {
        for (name, def) in &job.triggers {
            let source = if def.is_event_sourced() {
                let reference = def.reference.clone().ok_or_else(|| {
                    LogicTreeError::ConfigError(format!(
                        "event trigger '{name}' in job '{}' has no reference",
                        job.name
                    ))
                })?;
                let id = TriggerId(self.tree.triggers.len());
                self.references.push(PendingReference {
                    trigger: id,
                    job_name: job.name.clone(),
                    job: idx,
                    reference: reference.clone(),
                });
                TriggerSource::Events {
                    events: def.events.iter().cloned().collect::<BTreeSet<_>>(),
                    reference,
                    target: None,
                }
            } else {
                let plugin = def.plugin.clone().ok_or_else(|| {
                    LogicTreeError::ConfigError(format!(
                        "trigger '{name}' in job '{}' needs either 'plugin' or 'events'",
                        job.name
                    ))
                })?;
                let trigger = self.registry.resolve_trigger(&plugin)?;
                trigger.validate(&def.parameters).map_err(|err| {
                    LogicTreeError::ConfigError(format!(
                        "trigger '{name}' in job '{}': {err:#}",
                        job.name
                    ))
                })?;
                TriggerSource::Plugin {
                    plugin,
                    trigger,
                    parameters: def.parameters.clone(),
                }
            };

            self.tree
                .triggers
                .push(TriggerShell::new(name.clone(), job.name.clone(), source));
            let id = TriggerId(self.tree.triggers.len() - 1);
            if let Some(scope) = self.tree.node_mut(idx).scope.as_mut() {
                scope.triggers.insert(name.clone(), id);
            }
        }
        Ok(())
    }

    fn declare_loggers(&mut self, idx: NodeIndex, job: &Job) -> Result<()> {
        for (name, def) in &job.loggers {
            let logger = self.registry.resolve_logger(&def.plugin)?;
            let filter = logger.log_events(&def.parameters);
            let id = self.tree.dispatcher.add_logger(LoggerBinding {
                name: name.clone(),
                logger,
                parameters: def.parameters.clone(),
                filter,
            });
            if let Some(scope) = self.tree.node_mut(idx).scope.as_mut() {
                scope.loggers.insert(name.clone(), id);
            }
        }
        Ok(())
    }

    fn resolve_trigger(&self, name: &str) -> Result<TriggerId> {
        self.stack
            .iter()
            .rev()
            .find_map(|frame| {
                self.tree
                    .node(frame.index)
                    .scope
                    .as_ref()
                    .and_then(|scope| scope.triggers.get(name).copied())
            })
            .ok_or_else(|| self.unresolved(name))
    }

    fn resolve_logger(&self, name: &str) -> Result<LoggerId> {
        self.stack
            .iter()
            .rev()
            .find_map(|frame| {
                self.tree
                    .node(frame.index)
                    .scope
                    .as_ref()
                    .and_then(|scope| scope.loggers.get(name).copied())
            })
            .ok_or_else(|| self.unresolved(name))
    }

    fn unresolved(&self, name: &str) -> LogicTreeError {
        LogicTreeError::UnresolvedReference {
            job: self.frame().job.name.clone(),
            name: name.to_string(),
        }
    }

    fn build_expression(&mut self, syntax: &SyntaxNode, parent: NodeIndex) -> Result<NodeIndex> {
        match syntax {
            SyntaxNode::Reference(name) => self.build_reference(name, parent),
            SyntaxNode::Literal { value } | SyntaxNode::Bare(value) => {
                Ok(self.build_constant(value.clone(), parent))
            }
            SyntaxNode::Modifier { modifier, operand } => {
                self.build_modifier(*modifier, operand, parent)
            }
            SyntaxNode::Operator { op, operands } => {
                let operator = parse_operator(op, operands.len())?;
                let spec = self.list_spec(&self.frame().job, operator, operands.len());
                let id = self.generate_id(operator.as_str());
                let idx = self.add(
                    LogicalNode::new(id, operator.as_str(), NodeKind::List(spec)),
                    Some(parent),
                );
                for operand in operands {
                    self.build_expression(operand, idx)?;
                }
                Ok(idx)
            }
        }
    }

    fn build_constant(&mut self, value: Value, parent: NodeIndex) -> NodeIndex {
        let id = self.generate_id("Const");
        self.add(
            LogicalNode::new(id, "Const", NodeKind::Constant { value }),
            Some(parent),
        )
    }

    fn build_modifier(
        &mut self,
        kind: ValueKind,
        operand: &SyntaxNode,
        parent: NodeIndex,
    ) -> Result<NodeIndex> {
        let id = self.generate_id(&kind.to_string());
        let idx = self.add(
            LogicalNode::new(id, kind.to_string(), NodeKind::ValueModifier { kind }),
            Some(parent),
        );
        self.build_expression(operand, idx)?;
        Ok(idx)
    }

    fn build_reference(&mut self, name: &str, parent: NodeIndex) -> Result<NodeIndex> {
        let owner = self
            .stack
            .iter()
            .rev()
            .find(|frame| frame.job.checkers.contains_key(name))
            .map(|frame| frame.index);

        match owner {
            Some(owner) => self.build_checker(owner, name, parent),
            None if self.built_jobs.contains_key(name) || self.jobs.get_job(name).is_some() => {
                self.build_job(name, Some(parent))
            }
            None => Err(LogicTreeError::UnresolvedReference {
                job: self.frame().job.name.clone(),
                name: name.to_string(),
            }),
        }
    }

    fn build_checker(&mut self, owner: NodeIndex, name: &str, parent: NodeIndex) -> Result<NodeIndex> {
        let key = (owner, name.to_string());
        if let Some(&target) = self.built_checkers.get(&key) {
            let id = self.generate_id(name);
            debug!(checker = name, %id, "checker already built; adding connector");
            let idx = self.add(
                LogicalNode::new(id, name, NodeKind::NodeConnector { target }),
                Some(parent),
            );
            self.tree.node_mut(target).aliases.push(idx);
            return Ok(idx);
        }

        let def = self
            .stack
            .iter()
            .find(|frame| frame.index == owner)
            .and_then(|frame| frame.job.checkers.get(name).cloned())
            .ok_or_else(|| self.unresolved(name))?;

        let checker = self.registry.resolve_checker(&def.plugin)?;
        let mut node = LogicalNode::new(
            name,
            name,
            NodeKind::Checker {
                plugin: def.plugin.clone(),
                checker,
                parameters: def.parameters.clone(),
            },
        );
        node.init_nodes = def.init_nodes;
        node.lock = self.frame().lock.clone();
        if let Some(logger) = &def.logger {
            node.logger = Some(self.resolve_logger(logger)?);
        }
        if let Some(trigger) = &def.trigger {
            let trigger = self.resolve_trigger(trigger)?;
            self.tree.triggers[trigger.0].register_trigger_it();
            node.trigger = Some(trigger);
        }

        let idx = self.add(node, Some(parent));
        self.built_checkers.insert(key, idx);
        Ok(idx)
    }

    /// Look `id` up below `job` first, then anywhere in the tree.
    fn find_node(&self, job: NodeIndex, id: &str) -> Option<NodeIndex> {
        self.tree
            .find_in_job(job, id)
            .or_else(|| self.tree.find_by_id(id))
    }

    fn resolve_event_triggers(&mut self) -> Result<()> {
        for pending in std::mem::take(&mut self.references) {
            let target = self.find_node(pending.job, &pending.reference).ok_or_else(|| {
                LogicTreeError::UnresolvedReference {
                    job: pending.job_name.clone(),
                    name: pending.reference.clone(),
                }
            })?;
            if let TriggerSource::Events { target: slot, .. } =
                &mut self.tree.triggers[pending.trigger.0].source
            {
                *slot = Some(target);
            }
            debug!(
                trigger = %self.tree.triggers[pending.trigger.0].name,
                target = %self.tree.path(target),
                "event trigger bound"
            );
        }
        Ok(())
    }

    fn bind_workers(&mut self) -> Result<()> {
        for pending in std::mem::take(&mut self.workers) {
            let sender = match &pending.def.node {
                Some(id) => self.find_node(pending.job, id).ok_or_else(|| {
                    LogicTreeError::UnresolvedReference {
                        job: pending.job_name.clone(),
                        name: id.clone(),
                    }
                })?,
                None => pending.job,
            };
            let worker = self.registry.resolve_worker(&pending.def.plugin)?;
            let id = self.tree.dispatcher.add_worker(WorkerBinding {
                job: pending.job,
                event: pending.def.event.clone(),
                sender,
                plugin: pending.def.plugin.clone(),
                worker,
                parameters: pending.def.parameters.clone(),
                trigger: pending.trigger,
            });
            debug!(worker = %id, event = %pending.def.event, sender = %self.tree.path(sender), "worker bound");
        }
        Ok(())
    }
}

fn parse_operator(op: &str, operands: usize) -> Result<Operator> {
    let operator: Operator = op.parse().map_err(LogicTreeError::InvalidExpression)?;
    let arity_ok = match operator {
        Operator::Not => operands == 1,
        o if o.is_comparison() => operands >= 2,
        _ => operands >= 1,
    };
    if !arity_ok {
        return Err(LogicTreeError::InvalidExpression(format!(
            "{operator} cannot take {operands} operand(s)"
        )));
    }
    Ok(operator)
}
