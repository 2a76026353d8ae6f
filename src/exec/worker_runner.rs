// src/exec/worker_runner.rs

//! Runs one worker execution on the shared tokio pool.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::engine::{RuntimeEvent, WorkerRequest};
use crate::plugin::WorkerContext;

/// Spawn `request`; `WorkerFinished` is sent whether the worker succeeded,
/// failed, panicked, or was broken.
pub fn spawn_worker(
    request: WorkerRequest,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let worker = request.worker;
        let sender = request.sender;
        let node_id = request.node_id.clone();
        info!(%worker, node = %node_id, event = %request.event.name, "executing worker");

        let ctx = WorkerContext {
            node_id: request.node_id,
            parameters: request.parameters,
            event: request.event,
            environment: request.environment,
            resetting: request.resetting,
            cancel,
        };
        let plugin = request.plugin;
        let exec = tokio::spawn(async move { plugin.exec(ctx).await });

        match exec.await {
            Ok(Ok(())) => debug!(%worker, node = %node_id, "worker finished"),
            Ok(Err(err)) => error!(%worker, node = %node_id, error = %format!("{err:#}"), "worker failed"),
            Err(join) => error!(%worker, node = %node_id, error = %join, "worker panicked"),
        }

        if runtime_tx
            .send(RuntimeEvent::WorkerFinished { worker, sender })
            .await
            .is_err()
        {
            debug!(%worker, "runtime gone; worker completion dropped");
        }
    })
}
