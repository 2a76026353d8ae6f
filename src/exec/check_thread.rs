// src/exec/check_thread.rs

//! Dedicated thread per running check.
//!
//! Checks may need thread affinity, so each one gets its own OS thread with
//! a current-thread tokio runtime instead of a slot on the shared pool. The
//! thread reports back over the runtime channel; a cancelled check reports
//! nothing.

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::engine::{CheckRequest, RuntimeEvent, TreeControl};
use crate::exec::locks::NamedLocks;
use crate::plugin::{CheckContext, CheckFault, ProgressReporter};

/// Spawn the thread running `request`.
pub fn spawn_check_thread(
    request: CheckRequest,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel: CancellationToken,
    locks: NamedLocks,
    control: TreeControl,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("check-{}", request.id))
        .spawn(move || run_check_thread(request, runtime_tx, cancel, locks, control))
}

fn run_check_thread(
    request: CheckRequest,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel: CancellationToken,
    locks: NamedLocks,
    control: TreeControl,
) {
    let node = request.node;
    let generation = request.generation;

    control.wait_while_paused_blocking();
    if cancel.is_cancelled() {
        debug!(node = %request.path, generation, "check cancelled before start");
        return;
    }

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(node = %request.path, error = %e, "failed to build check runtime");
            let fault = CheckFault::new("runtime", e.to_string());
            if runtime_tx
                .blocking_send(RuntimeEvent::CheckFaulted {
                    node,
                    generation,
                    fault,
                })
                .is_err()
            {
                warn!(node = %request.path, generation, "runtime gone; check fault dropped");
            }
            return;
        }
    };

    let progress_tx = runtime_tx.clone();
    let progress = ProgressReporter::new(move |progress| {
        if progress_tx
            .try_send(RuntimeEvent::CheckProgress {
                node,
                generation,
                progress,
            })
            .is_err()
        {
            debug!(generation, "progress report dropped");
        }
    });

    let ctx = CheckContext {
        node_id: request.id.clone(),
        path: request.path.clone(),
        parameters: request.parameters.clone(),
        environment: request.environment.clone(),
        event: request.event.clone(),
        progress,
    };

    let checker = request.checker.clone();
    let lock = request.lock.as_deref().map(|name| locks.get(name));
    let token = cancel.clone();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        rt.block_on(async move {
            tokio::select! {
                _ = token.cancelled() => None,
                result = async {
                    let _guard = match &lock {
                        Some(lock) => Some(lock.lock().await),
                        None => None,
                    };
                    checker.run(ctx).await
                } => Some(result),
            }
        })
    }));

    let event = match outcome {
        Ok(None) => {
            debug!(node = %request.path, generation, "check cancelled");
            return;
        }
        Ok(Some(Ok(outcome))) => RuntimeEvent::CheckCompleted {
            node,
            generation,
            outcome,
        },
        Ok(Some(Err(fault))) => RuntimeEvent::CheckFaulted {
            node,
            generation,
            fault,
        },
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "check panicked".to_string());
            error!(node = %request.path, generation, %message, "check panicked");
            RuntimeEvent::CheckFaulted {
                node,
                generation,
                fault: CheckFault::new("panic", message),
            }
        }
    };

    if cancel.is_cancelled() {
        debug!(node = %request.path, generation, "check cancelled after finishing; result dropped");
        return;
    }
    if runtime_tx.blocking_send(event).is_err() {
        warn!(node = %request.path, generation, "runtime gone; check result dropped");
    }
}
