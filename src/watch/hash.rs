// src/watch/hash.rs

//! Content hashing so file-watch triggers only fire on real changes.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

use crate::fs::FileSystem;

/// Hash of a single file's contents.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Deterministic hash over the contents of `paths`, independent of order.
///
/// File names take part in the hash, so renaming a matching file counts as a
/// change too.
pub fn compute_hash_for_paths(fs: &dyn FileSystem, paths: &[PathBuf]) -> Result<String> {
    let mut sorted: Vec<&PathBuf> = paths.iter().collect();
    sorted.sort();

    let mut hasher = Hasher::new();
    for path in sorted {
        if !fs.is_file(path) {
            continue;
        }
        let file_hash = compute_file_hash(fs, path)?;
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(file_hash.as_bytes());
    }

    let hash = hasher.finalize().to_hex().to_string();
    debug!(hash = %hash, files = paths.len(), "computed aggregate hash");
    Ok(hash)
}
