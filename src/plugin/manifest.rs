// src/plugin/manifest.rs

//! Command manifests: external plugins described by a TOML file.
//!
//! ```toml
//! command = "pg_isready -h {parameters}"
//! match_stdout = "accepting connections"
//! timeout = "5s"
//!
//! [env]
//! PGCONNECT_TIMEOUT = "3"
//! ```
//!
//! `{parameters}` is replaced by the node's parameters; without the
//! placeholder the parameters are appended. Manifests are cached by path and
//! reloaded when their modification time moves.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use tracing::info;

use crate::fs::FileSystem;
use crate::types::parse_duration;

const PLACEHOLDER: &str = "{parameters}";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    command: String,
    #[serde(default)]
    match_stdout: Option<String>,
    #[serde(default)]
    timeout: Option<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

/// A validated manifest.
#[derive(Debug, Clone)]
pub struct CommandManifest {
    pub command: String,
    pub match_stdout: Option<Regex>,
    pub timeout: Option<Duration>,
    pub env: BTreeMap<String, String>,
}

impl CommandManifest {
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawManifest = toml::from_str(text).context("parsing command manifest")?;
        if raw.command.trim().is_empty() {
            anyhow::bail!("command manifest has an empty 'command'");
        }
        let match_stdout = raw
            .match_stdout
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("compiling 'match_stdout'")?;
        let timeout = raw
            .timeout
            .as_deref()
            .map(parse_duration)
            .transpose()
            .map_err(anyhow::Error::msg)
            .context("parsing 'timeout'")?;
        Ok(Self {
            command: raw.command,
            match_stdout,
            timeout,
            env: raw.env,
        })
    }

    /// Shell command line for `parameters`.
    pub fn render(&self, parameters: &str) -> String {
        if self.command.contains(PLACEHOLDER) {
            self.command.replace(PLACEHOLDER, parameters)
        } else if parameters.trim().is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, parameters)
        }
    }
}

#[derive(Debug)]
struct CachedManifest {
    modified: SystemTime,
    manifest: Arc<CommandManifest>,
}

/// Path -> manifest cache with modification-time reload.
#[derive(Debug)]
pub struct ManifestCache {
    fs: Arc<dyn FileSystem>,
    entries: Mutex<HashMap<PathBuf, CachedManifest>>,
}

impl ManifestCache {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PathBuf, CachedManifest>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current manifest at `path`, re-read if the file changed since the
    /// last load.
    pub fn load(&self, path: &Path) -> Result<Arc<CommandManifest>> {
        let modified = self.fs.modified(path)?;
        if let Some(cached) = self.entries().get(path) {
            if cached.modified == modified {
                return Ok(Arc::clone(&cached.manifest));
            }
        }

        let text = self.fs.read_to_string(path)?;
        let manifest = Arc::new(
            CommandManifest::parse(&text).with_context(|| format!("loading manifest {:?}", path))?,
        );
        let reloaded = self
            .entries()
            .insert(
                path.to_path_buf(),
                CachedManifest {
                    modified,
                    manifest: Arc::clone(&manifest),
                },
            )
            .is_some();
        if reloaded {
            info!("command manifest {:?} changed; reloaded", path);
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn renders_parameters() {
        let with = CommandManifest::parse(r#"command = "ping -c1 {parameters}""#).unwrap();
        assert_eq!(with.render("db01"), "ping -c1 db01");
        let without = CommandManifest::parse(r#"command = "test -d""#).unwrap();
        assert_eq!(without.render("/tmp"), "test -d /tmp");
        assert_eq!(without.render(""), "test -d");
    }

    #[test]
    fn rejects_bad_manifests() {
        assert!(CommandManifest::parse(r#"command = """#).is_err());
        assert!(CommandManifest::parse(r#"command = "x"
match_stdout = "(""#)
        .is_err());
        assert!(CommandManifest::parse(r#"command = "x"
timeout = "soon""#)
        .is_err());
        assert!(CommandManifest::parse(r#"cmd = "x""#).is_err());
    }

    #[test]
    fn cache_reloads_on_modification() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("plugins/probe.toml", r#"command = "true""#);
        let cache = ManifestCache::new(fs.clone());
        let path = Path::new("plugins/probe.toml");

        let first = cache.load(path).unwrap();
        assert_eq!(first.command, "true");
        let again = cache.load(path).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        fs.add_file("plugins/probe.toml", r#"command = "false"
timeout = "2s""#);
        let reloaded = cache.load(path).unwrap();
        assert_eq!(reloaded.command, "false");
        assert_eq!(reloaded.timeout, Some(Duration::from_secs(2)));
    }
}
