// src/engine/runtime.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::fs::{FileSystem, RealFileSystem};
use crate::tree::snapshot::load_document;
use crate::tree::Tree;

use super::core::CoreRuntime;
use super::mode::TreeControl;
use super::{CoreCommand, Notification, RuntimeEvent};

/// Drives the tree in response to `RuntimeEvent`s and delegates plugin work
/// to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. This struct handles async IO: reading events from
/// channels, timers, snapshot reads, and handing work to the executor.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_tx: mpsc::Sender<RuntimeEvent>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    control: TreeControl,
    fs: Arc<dyn FileSystem>,
    notifications: Option<mpsc::UnboundedSender<Notification>>,
    /// Cancels pending retry and loop timers on exit.
    timers: CancellationToken,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("mode", &self.control.mode())
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    /// `event_tx` must feed `event_rx`; timers and snapshot loads send
    /// through it.
    pub fn new(
        core: CoreRuntime,
        event_tx: mpsc::Sender<RuntimeEvent>,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
    ) -> Self {
        Self {
            core,
            event_tx,
            event_rx,
            executor,
            control: TreeControl::new(),
            fs: Arc::new(RealFileSystem),
            notifications: None,
            timers: CancellationToken::new(),
        }
    }

    pub fn with_control(mut self, control: TreeControl) -> Self {
        self.control = control;
        self
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Receive every node notification the cascade produces.
    pub fn with_notifications(mut self, tx: mpsc::UnboundedSender<Notification>) -> Self {
        self.notifications = Some(tx);
        self
    }

    /// Handle for pausing, resuming and flushing the tree.
    pub fn control(&self) -> TreeControl {
        self.control.clone()
    }

    pub fn tree(&self) -> &Tree {
        self.core.tree()
    }

    /// Main event loop.
    ///
    /// - Waits while the tree is paused.
    /// - Drops run requests while the tree is flushing.
    /// - Feeds every other event into the core runtime.
    /// - Executes the commands returned by the core.
    ///
    /// Returns the tree once the core asks to stop or the channel closes.
    pub async fn run(mut self) -> Result<Tree> {
        info!(root = %self.core.tree().path(self.core.tree().root()), "logictree runtime started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            self.control.wait_while_paused().await;
            if self.control.is_flushing() && event.is_run_request() {
                debug!(?event, "tree flushing; run request dropped");
                continue;
            }

            debug!(?event, "runtime received event");
            let step = self.core.step(event);

            let receiver_gone = match &self.notifications {
                Some(tx) => step
                    .notifications
                    .into_iter()
                    .any(|notification| tx.send(notification).is_err()),
                None => false,
            };
            if receiver_gone {
                debug!("notification receiver gone");
                self.notifications = None;
            }

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        self.timers.cancel();
        self.executor.shutdown().await?;
        info!("runtime exiting");
        Ok(self.core.into_tree())
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::StartCheck(request) => {
                debug!(node = %request.path, generation = request.generation, "starting check");
                self.executor.start_check(request).await?;
            }
            CoreCommand::CancelCheck { node, generation } => {
                self.executor.cancel_check(node, generation).await?;
            }
            CoreCommand::ExecWorker(request) => {
                self.executor.exec_worker(request).await?;
            }
            CoreCommand::BreakWorker {
                worker,
                sender,
                plugin,
                node_id,
            } => {
                self.executor
                    .break_worker(worker, sender, plugin, node_id)
                    .await?;
            }
            CoreCommand::ArmTrigger(request) => {
                self.executor.arm_trigger(request).await?;
            }
            CoreCommand::DisarmTrigger { trigger } => {
                self.executor.disarm_trigger(trigger).await?;
            }
            CoreCommand::Log { logger, entry } => {
                logger.log(&entry);
            }
            CoreCommand::LoadSnapshot {
                node,
                generation,
                path,
            } => {
                self.load_snapshot(node, generation, PathBuf::from(path));
            }
            CoreCommand::ScheduleRetry { node, after } => {
                self.schedule(RuntimeEvent::RetryRun { node }, after);
            }
            CoreCommand::ScheduleRun { node, after } => {
                self.schedule(RuntimeEvent::DelayedRun { node }, after);
            }
            CoreCommand::RequestExit => {
                // The core already returns keep_running=false alongside this.
                info!("core issued RequestExit command");
            }
        }
        Ok(())
    }

    /// Feed `event` back into the loop after `after`.
    fn schedule(&self, event: RuntimeEvent, after: std::time::Duration) {
        let tx = self.event_tx.clone();
        let cancel = self.timers.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    if tx.send(event).await.is_err() {
                        debug!("runtime gone; timer event dropped");
                    }
                }
            }
        });
    }

    fn load_snapshot(&self, node: crate::tree::NodeIndex, generation: u64, path: PathBuf) {
        let tx = self.event_tx.clone();
        let fs = Arc::clone(&self.fs);
        tokio::spawn(async move {
            let loaded = tokio::task::spawn_blocking(move || load_document(fs.as_ref(), &path))
                .await
                .map_err(|e| format!("snapshot loader panicked: {e}"))
                .and_then(|r| r.map(Box::new).map_err(|e| format!("{e:#}")));
            if let Err(e) = &loaded {
                warn!(%node, generation, error = %e, "loading snapshot failed");
            }
            let event = RuntimeEvent::SnapshotLoaded {
                node,
                generation,
                document: loaded,
            };
            if tx.send(event).await.is_err() {
                debug!("runtime gone; snapshot dropped");
            }
        });
    }
}
