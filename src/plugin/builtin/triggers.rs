// src/plugin/builtin/triggers.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::fs::FileSystem;
use crate::plugin::{PluginFuture, Trigger, TriggerContext};
use crate::types::parse_duration;
use crate::watch::{
    WatchPatterns, collect_matching_files, compute_hash_for_paths, relative_str, watch_directory,
};

/// Events arriving within this window after a change are folded into one
/// fire.
const DEBOUNCE: Duration = Duration::from_millis(50);

fn interval_of(parameters: &str) -> Result<Duration> {
    let period = parse_duration(parameters).map_err(anyhow::Error::msg)?;
    if period.is_zero() {
        anyhow::bail!("interval must be greater than zero");
    }
    Ok(period)
}

/// `interval`: fires every period given as `500ms`, `10s`, `5m` or `1h`.
#[derive(Debug, Default)]
pub struct IntervalTrigger;

impl Trigger for IntervalTrigger {
    fn validate(&self, parameters: &str) -> Result<()> {
        interval_of(parameters).map(|_| ())
    }

    fn start(&self, ctx: TriggerContext) -> PluginFuture<'_, Result<()>> {
        Box::pin(async move {
            let period = interval_of(&ctx.parameters)?;
            debug!(trigger = %ctx.name, ?period, "interval trigger armed");
            loop {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    _ = tokio::time::sleep(period) => ctx.callback.fire(),
                }
            }
            debug!(trigger = %ctx.name, "interval trigger disarmed");
            Ok(())
        })
    }

    fn next_run(&self, parameters: &str, last: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let period = interval_of(parameters).ok()?;
        let period = chrono::Duration::from_std(period).ok()?;
        Some(last + period)
    }
}

/// `file_watch`: fires when the content of files matching the patterns
/// changes below the working directory.
#[derive(Debug)]
pub struct FileWatchTrigger {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
}

impl FileWatchTrigger {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self::with_root(fs, ".")
    }

    pub fn with_root(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    async fn content_hash(&self, patterns: &WatchPatterns) -> Result<String> {
        let fs = Arc::clone(&self.fs);
        let root = self.root.clone();
        let patterns = patterns.clone();
        tokio::task::spawn_blocking(move || {
            let files = collect_matching_files(fs.as_ref(), &root, &patterns)?;
            compute_hash_for_paths(fs.as_ref(), &files)
        })
        .await
        .context("hashing watched files")?
    }
}

fn relevant(root: &Path, patterns: &WatchPatterns, path: &Path) -> bool {
    relative_str(root, path).is_some_and(|rel| patterns.matches(&rel))
}

impl Trigger for FileWatchTrigger {
    fn validate(&self, parameters: &str) -> Result<()> {
        WatchPatterns::parse(parameters).map(|_| ())
    }

    fn start(&self, ctx: TriggerContext) -> PluginFuture<'_, Result<()>> {
        Box::pin(async move {
            let patterns = WatchPatterns::parse(&ctx.parameters)?;
            let (_handle, mut paths) = watch_directory(&self.root)?;
            let mut last_hash = self.content_hash(&patterns).await?;
            info!(trigger = %ctx.name, patterns = %ctx.parameters, "file watch trigger armed");

            loop {
                let path = tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    path = paths.recv() => match path {
                        Some(path) => path,
                        None => break,
                    },
                };
                if !relevant(&self.root, &patterns, &path) {
                    continue;
                }

                tokio::time::sleep(DEBOUNCE).await;
                while paths.try_recv().is_ok() {}

                match self.content_hash(&patterns).await {
                    Ok(hash) if hash != last_hash => {
                        debug!(trigger = %ctx.name, "watched content changed: {:?}", path);
                        last_hash = hash;
                        ctx.callback.fire();
                    }
                    Ok(_) => debug!(trigger = %ctx.name, "change without new content: {:?}", path),
                    Err(e) => warn!(trigger = %ctx.name, error = %e, "hashing watched files failed"),
                }
            }
            info!(trigger = %ctx.name, "file watch trigger disarmed");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::fs::mock::MockFileSystem;
    use crate::plugin::TriggerCallback;

    #[test]
    fn interval_validation() {
        let trigger = IntervalTrigger;
        assert!(trigger.validate("10s").is_ok());
        assert!(trigger.validate("0s").is_err());
        assert!(trigger.validate("often").is_err());

        let last = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let next = trigger.next_run("5m", last).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap());
    }

    #[tokio::test]
    async fn interval_fires_until_cancelled() {
        let fired = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let counter = Arc::clone(&fired);
        let ctx = TriggerContext {
            name: "tick".into(),
            parameters: "20ms".into(),
            callback: TriggerCallback::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            cancel: cancel.clone(),
        };

        let trigger = IntervalTrigger;
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(130)).await;
            stopper.cancel();
        });
        trigger.start(ctx).await.unwrap();
        assert!(fired.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn file_watch_validation_and_filtering() {
        let trigger = FileWatchTrigger::new(Arc::new(MockFileSystem::new()));
        assert!(trigger.validate("**/*.csv").is_ok());
        assert!(trigger.validate("!**/*.csv").is_err());

        let patterns = WatchPatterns::parse("**/*.csv;!tmp/**").unwrap();
        let root = Path::new("data");
        assert!(relevant(root, &patterns, Path::new("data/in/a.csv")));
        assert!(!relevant(root, &patterns, Path::new("data/tmp/a.csv")));
        assert!(!relevant(root, &patterns, Path::new("elsewhere/a.csv")));
    }
}
