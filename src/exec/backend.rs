// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime hands checks, workers and triggers to an `ExecutorBackend`
//! instead of spawning them itself. Tests swap in a fake that records the
//! requests and feeds `RuntimeEvent`s back by hand.
//!
//! - `RealExecutorBackend` runs every check on a dedicated thread
//!   ([`super::check_thread`]), workers and triggers on the tokio pool.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{CheckRequest, RuntimeEvent, TreeControl, TriggerRequest, WorkerRequest};
use crate::errors::Result;
use crate::plugin::{CheckFault, Worker};
use crate::tree::{NodeIndex, WorkerId};
use crate::trigger::TriggerId;

use super::check_thread::spawn_check_thread;
use super::locks::NamedLocks;
use super::trigger_host::spawn_trigger;
use super::worker_runner::spawn_worker;

pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Trait abstracting how plugin work is executed.
///
/// Production code uses [`RealExecutorBackend`]; tests can provide their own
/// implementation that doesn't spawn threads or processes.
pub trait ExecutorBackend: Send {
    fn start_check(&mut self, request: CheckRequest) -> BackendFuture<'_>;

    /// Stop the check of `node` started with `generation`; later generations
    /// are left alone.
    fn cancel_check(&mut self, node: NodeIndex, generation: u64) -> BackendFuture<'_>;

    fn exec_worker(&mut self, request: WorkerRequest) -> BackendFuture<'_>;

    fn break_worker(
        &mut self,
        worker: WorkerId,
        sender: NodeIndex,
        plugin: Arc<dyn Worker>,
        node_id: String,
    ) -> BackendFuture<'_>;

    fn arm_trigger(&mut self, request: TriggerRequest) -> BackendFuture<'_>;

    fn disarm_trigger(&mut self, trigger: TriggerId) -> BackendFuture<'_>;

    /// Cancel everything still running.
    fn shutdown(&mut self) -> BackendFuture<'_>;
}

struct ActiveCheck {
    generation: u64,
    cancel: CancellationToken,
    thread: std::thread::JoinHandle<()>,
}

struct ActiveTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Real executor backend used in production.
pub struct RealExecutorBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    control: TreeControl,
    locks: NamedLocks,
    /// At most one check per node.
    checks: HashMap<NodeIndex, ActiveCheck>,
    workers: HashMap<(WorkerId, NodeIndex), ActiveTask>,
    triggers: HashMap<TriggerId, ActiveTask>,
}

impl std::fmt::Debug for RealExecutorBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealExecutorBackend")
            .field("checks", &self.checks.len())
            .field("workers", &self.workers.len())
            .field("triggers", &self.triggers.len())
            .finish()
    }
}

impl RealExecutorBackend {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, control: TreeControl) -> Self {
        Self {
            runtime_tx,
            control,
            locks: NamedLocks::new(),
            checks: HashMap::new(),
            workers: HashMap::new(),
            triggers: HashMap::new(),
        }
    }

    fn prune(&mut self) {
        self.checks.retain(|_, check| !check.thread.is_finished());
        self.workers.retain(|_, task| !task.handle.is_finished());
    }

    fn start_check_now(&mut self, request: CheckRequest) {
        self.prune();
        let node = request.node;
        if let Some(previous) = self.checks.remove(&node) {
            debug!(%node, generation = previous.generation, "superseding running check");
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let generation = request.generation;
        let path = request.path.clone();
        let thread = match spawn_check_thread(
            request,
            self.runtime_tx.clone(),
            cancel.clone(),
            self.locks.clone(),
            self.control.clone(),
        ) {
            Ok(thread) => thread,
            Err(e) => {
                error!(node = %path, generation, error = %e, "failed to spawn check thread");
                report_spawn_fault(&self.runtime_tx, node, generation, &e);
                return;
            }
        };
        debug!(node = %path, generation, "check thread started");

        self.checks.insert(
            node,
            ActiveCheck {
                generation,
                cancel,
                thread,
            },
        );
    }

    fn cancel_check_now(&mut self, node: NodeIndex, generation: u64) {
        if !self
            .checks
            .get(&node)
            .is_some_and(|check| check.generation == generation)
        {
            return;
        }
        if let Some(check) = self.checks.remove(&node) {
            debug!(%node, generation, "cancelling check");
            check.cancel.cancel();
        }
    }

    fn exec_worker_now(&mut self, request: WorkerRequest) {
        self.prune();
        let key = (request.worker, request.sender);
        if let Some(previous) = self.workers.remove(&key) {
            previous.cancel.cancel();
        }
        let cancel = CancellationToken::new();
        let handle = spawn_worker(request, self.runtime_tx.clone(), cancel.clone());
        self.workers.insert(key, ActiveTask { cancel, handle });
    }

    fn arm_trigger_now(&mut self, request: TriggerRequest) {
        let trigger = request.trigger;
        if self.triggers.contains_key(&trigger) {
            debug!(%trigger, "trigger already armed");
            return;
        }
        let cancel = CancellationToken::new();
        let handle = spawn_trigger(request, self.runtime_tx.clone(), cancel.clone());
        self.triggers.insert(trigger, ActiveTask { cancel, handle });
    }

    fn shutdown_now(&mut self) {
        info!(
            checks = self.checks.len(),
            workers = self.workers.len(),
            triggers = self.triggers.len(),
            "stopping executor"
        );
        for (_, check) in self.checks.drain() {
            check.cancel.cancel();
        }
        for (_, task) in self.workers.drain() {
            task.cancel.cancel();
        }
        for (_, task) in self.triggers.drain() {
            task.cancel.cancel();
        }
    }
}

/// Fault the node whose check thread never started.
///
/// The send runs on its own task: the runtime loop is the receiver and may be
/// the one awaiting this backend call.
fn report_spawn_fault(
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    node: NodeIndex,
    generation: u64,
    error: &std::io::Error,
) {
    let event = RuntimeEvent::CheckFaulted {
        node,
        generation,
        fault: CheckFault::new("spawn", error.to_string()),
    };
    let tx = runtime_tx.clone();
    tokio::spawn(async move {
        if tx.send(event).await.is_err() {
            warn!(%node, generation, "runtime gone; spawn fault dropped");
        }
    });
}

impl ExecutorBackend for RealExecutorBackend {
    fn start_check(&mut self, request: CheckRequest) -> BackendFuture<'_> {
        self.start_check_now(request);
        Box::pin(async { Ok(()) })
    }

    fn cancel_check(&mut self, node: NodeIndex, generation: u64) -> BackendFuture<'_> {
        self.cancel_check_now(node, generation);
        Box::pin(async { Ok(()) })
    }

    fn exec_worker(&mut self, request: WorkerRequest) -> BackendFuture<'_> {
        self.exec_worker_now(request);
        Box::pin(async { Ok(()) })
    }

    fn break_worker(
        &mut self,
        worker: WorkerId,
        sender: NodeIndex,
        plugin: Arc<dyn Worker>,
        node_id: String,
    ) -> BackendFuture<'_> {
        if let Some(task) = self.workers.remove(&(worker, sender)) {
            debug!(%worker, node = %node_id, "breaking worker");
            task.cancel.cancel();
        }
        plugin.break_exec(&node_id);
        Box::pin(async { Ok(()) })
    }

    fn arm_trigger(&mut self, request: TriggerRequest) -> BackendFuture<'_> {
        self.arm_trigger_now(request);
        Box::pin(async { Ok(()) })
    }

    fn disarm_trigger(&mut self, trigger: TriggerId) -> BackendFuture<'_> {
        if let Some(task) = self.triggers.remove(&trigger) {
            debug!(%trigger, "disarming trigger");
            task.cancel.cancel();
        }
        Box::pin(async { Ok(()) })
    }

    fn shutdown(&mut self) -> BackendFuture<'_> {
        self.shutdown_now();
        Box::pin(async { Ok(()) })
    }
}
