// src/plugin/registry.rs

//! Name -> plugin resolution.
//!
//! A plugin reference is either the name of a registered plugin or a path
//! ending in `.toml` that points to a command manifest (checkers and workers
//! only). Manifest-backed plugins re-read their manifest when the file
//! changes, so a running tree picks up edits without a rebuild.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::errors::{LogicTreeError, Result};
use crate::fs::FileSystem;
use crate::plugin::builtin::{self, command::ManifestChecker, command::ManifestWorker};
use crate::plugin::manifest::ManifestCache;
use crate::plugin::{Checker, Trigger, TreeLogger, Worker};

const MANIFEST_EXTENSION: &str = "toml";

#[derive(Debug)]
pub struct PluginRegistry {
    fs: Arc<dyn FileSystem>,
    /// Base for relative manifest paths.
    plugin_dir: Option<PathBuf>,
    checkers: BTreeMap<String, Arc<dyn Checker>>,
    triggers: BTreeMap<String, Arc<dyn Trigger>>,
    workers: BTreeMap<String, Arc<dyn Worker>>,
    loggers: BTreeMap<String, Arc<dyn TreeLogger>>,
    manifests: Arc<ManifestCache>,
}

impl PluginRegistry {
    /// Empty registry; only manifest references resolve.
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            manifests: Arc::new(ManifestCache::new(Arc::clone(&fs))),
            fs,
            plugin_dir: None,
            checkers: BTreeMap::new(),
            triggers: BTreeMap::new(),
            workers: BTreeMap::new(),
            loggers: BTreeMap::new(),
        }
    }

    pub fn with_builtins(fs: Arc<dyn FileSystem>) -> Self {
        let mut registry = Self::new(Arc::clone(&fs));
        builtin::register_builtins(&mut registry, fs);
        registry
    }

    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = Some(dir.into());
        self
    }

    pub fn register_checker(&mut self, name: &str, checker: Arc<dyn Checker>) {
        self.checkers.insert(name.to_string(), checker);
    }

    pub fn register_trigger(&mut self, name: &str, trigger: Arc<dyn Trigger>) {
        self.triggers.insert(name.to_string(), trigger);
    }

    pub fn register_worker(&mut self, name: &str, worker: Arc<dyn Worker>) {
        self.workers.insert(name.to_string(), worker);
    }

    pub fn register_logger(&mut self, name: &str, logger: Arc<dyn TreeLogger>) {
        self.loggers.insert(name.to_string(), logger);
    }

    pub fn resolve_checker(&self, reference: &str) -> Result<Arc<dyn Checker>> {
        if let Some(checker) = self.checkers.get(reference) {
            return Ok(Arc::clone(checker));
        }
        let path = self.manifest_path(reference)?;
        Ok(Arc::new(ManifestChecker {
            path,
            cache: Arc::clone(&self.manifests),
        }))
    }

    pub fn resolve_worker(&self, reference: &str) -> Result<Arc<dyn Worker>> {
        if let Some(worker) = self.workers.get(reference) {
            return Ok(Arc::clone(worker));
        }
        let path = self.manifest_path(reference)?;
        Ok(Arc::new(ManifestWorker {
            path,
            cache: Arc::clone(&self.manifests),
        }))
    }

    pub fn resolve_trigger(&self, reference: &str) -> Result<Arc<dyn Trigger>> {
        self.triggers
            .get(reference)
            .cloned()
            .ok_or_else(|| LogicTreeError::PluginNotFound(format!("trigger '{reference}'")))
    }

    pub fn resolve_logger(&self, reference: &str) -> Result<Arc<dyn TreeLogger>> {
        self.loggers
            .get(reference)
            .cloned()
            .ok_or_else(|| LogicTreeError::PluginNotFound(format!("logger '{reference}'")))
    }

    /// Registered names per kind, for `--dry-run` listings.
    pub fn names(&self) -> BTreeMap<&'static str, Vec<String>> {
        BTreeMap::from([
            ("checker", self.checkers.keys().cloned().collect()),
            ("trigger", self.triggers.keys().cloned().collect()),
            ("worker", self.workers.keys().cloned().collect()),
            ("logger", self.loggers.keys().cloned().collect()),
        ])
    }

    /// Validate a manifest reference and return the path it resolves to.
    fn manifest_path(&self, reference: &str) -> Result<PathBuf> {
        let raw = Path::new(reference);
        if raw.extension().and_then(|e| e.to_str()) != Some(MANIFEST_EXTENSION) {
            return Err(LogicTreeError::PluginNotFound(reference.to_string()));
        }
        let path = match &self.plugin_dir {
            Some(dir) if raw.is_relative() => dir.join(raw),
            _ => raw.to_path_buf(),
        };
        if !self.fs.is_file(&path) {
            return Err(LogicTreeError::PluginNotFound(format!(
                "manifest {}",
                path.display()
            )));
        }
        self.manifests
            .load(&path)
            .map_err(|e| LogicTreeError::PluginLoad(format!("{e:#}")))?;
        debug!("resolved manifest plugin {:?}", path);
        Ok(path)
    }
}
