// src/fs/mod.rs

//! Filesystem access used by plugins, snapshots and the plugin registry.
//!
//! Everything that touches disk outside of spawned processes goes through
//! [`FileSystem`], so tests can swap in [`mock::MockFileSystem`].

use std::fmt::Debug;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

pub mod mock;

pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>>;

    /// Write `contents` so that readers see either the old file or the
    /// complete new one. Snapshot jobs of other instances read these files
    /// while they are being rewritten.
    fn replace(&self, path: &Path, contents: &[u8]) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;

    /// Last modification time; drives manifest hot reload.
    fn modified(&self, path: &Path) -> Result<SystemTime>;

    /// Full paths of the entries of a directory.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

/// `state.json` -> `.state.json.tmp` next to it.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading file {:?}", path))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let file = fs::File::open(path).with_context(|| format!("opening file {:?}", path))?;
        Ok(Box::new(file))
    }

    fn replace(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
        }
        let staging = staging_path(path);
        {
            let mut file = fs::File::create(&staging)
                .with_context(|| format!("creating file {:?}", staging))?;
            file.write_all(contents)
                .and_then(|_| file.sync_all())
                .with_context(|| format!("writing to file {:?}", staging))?;
        }
        fs::rename(&staging, path)
            .with_context(|| format!("moving {:?} over {:?}", staging, path))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        fs::metadata(path)
            .and_then(|meta| meta.modified())
            .with_context(|| format!("reading modification time of {:?}", path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        fs::read_dir(path)
            .with_context(|| format!("reading dir {:?}", path))?
            .map(|entry| Ok(entry?.path()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_leaves_no_staging_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let fs = RealFileSystem;

        fs.replace(&path, b"{\"v\":1}").unwrap();
        fs.replace(&path, b"{\"v\":2}").unwrap();

        assert_eq!(fs.read_to_string(&path).unwrap(), "{\"v\":2}");
        let entries = fs.read_dir(path.parent().unwrap()).unwrap();
        assert_eq!(entries, vec![path.clone()]);
        assert!(!staging_path(&path).exists());
    }
}
