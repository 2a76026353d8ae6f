// src/watch/watcher.rs

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Keeps the underlying `RecommendedWatcher` alive; dropping it stops
/// watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Watch `root` recursively and forward every changed path.
///
/// The notify callback runs on notify's own thread; paths are handed to the
/// async side over an unbounded channel.
pub fn watch_directory(root: &Path) -> Result<(WatcherHandle, mpsc::UnboundedReceiver<PathBuf>)> {
    let (path_tx, path_rx) = mpsc::unbounded_channel::<PathBuf>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                debug!(kind = ?event.kind, paths = event.paths.len(), "notify event");
                for path in event.paths {
                    if path_tx.send(path).is_err() {
                        return;
                    }
                }
            }
            Err(err) => warn!(error = %err, "file watch error"),
        },
        Config::default(),
    )
    .context("creating file watcher")?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .with_context(|| format!("watching {:?}", root))?;
    info!("file watcher started on {:?}", root);

    Ok((WatcherHandle { _inner: watcher }, path_rx))
}
