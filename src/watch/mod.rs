// src/watch/mod.rs

//! File watching and change detection for the `file_watch` trigger.
//!
//! - [`patterns`] compiles include/exclude globs.
//! - [`watcher`] wires up a cross-platform watcher (`notify`).
//! - [`hash`] computes aggregate content hashes so unchanged files do not
//!   fire the trigger.

pub mod hash;
pub mod patterns;
pub mod watcher;

pub use hash::{compute_file_hash, compute_hash_for_paths};
pub use patterns::{collect_matching_files, relative_str, WatchPatterns};
pub use watcher::{watch_directory, WatcherHandle};
