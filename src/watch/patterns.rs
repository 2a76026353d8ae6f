// src/watch/patterns.rs

//! Glob patterns of a `file_watch` trigger.
//!
//! Parameters are `;`-separated globs relative to the watch root; a leading
//! `!` turns a glob into an exclude:
//!
//! ```text
//! data/**/*.csv;!data/tmp/**
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::fs::FileSystem;

/// Compiled include/exclude globs.
#[derive(Clone)]
pub struct WatchPatterns {
    raw: String,
    watch_set: GlobSet,
    exclude_set: Option<GlobSet>,
}

impl fmt::Debug for WatchPatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchPatterns")
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

impl WatchPatterns {
    pub fn parse(spec: &str) -> Result<Self> {
        let mut watch = Vec::new();
        let mut exclude = Vec::new();
        for part in spec.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            match part.strip_prefix('!') {
                Some(pattern) => exclude.push(pattern.trim()),
                None => watch.push(part),
            }
        }
        if watch.is_empty() {
            bail!("no watch pattern in '{spec}'");
        }

        let watch_set = build_globset(&watch).context("building watch globset")?;
        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(&exclude).context("building exclude globset")?)
        };
        Ok(Self {
            raw: spec.to_string(),
            watch_set,
            exclude_set,
        })
    }

    /// `rel_path` uses forward slashes and is relative to the watch root.
    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.watch_set.is_match(rel_path) {
            return false;
        }
        match &self.exclude_set {
            Some(exclude) => !exclude.is_match(rel_path),
            None => true,
        }
    }
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// `path` relative to `root`, with forward slashes.
///
/// Falls back to canonical paths for platforms that report events under a
/// different absolute prefix of the same directory.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_string_lossy().replace('\\', "/"));
    }
    let (root, path) = (root.canonicalize().ok()?, path.canonicalize().ok()?);
    path.strip_prefix(&root)
        .ok()
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
}

/// All files under `root` that match `patterns`.
pub fn collect_matching_files(
    fs: &dyn FileSystem,
    root: &Path,
    patterns: &WatchPatterns,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for path in fs.read_dir(&dir)? {
            if fs.is_dir(&path) {
                stack.push(path);
            } else if fs.is_file(&path) {
                if let Some(rel) = relative_str(root, &path) {
                    if patterns.matches(&rel) {
                        files.push(path);
                    }
                }
            }
        }
    }

    files.sort();
    Ok(files)
}
