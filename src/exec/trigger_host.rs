// src/exec/trigger_host.rs

//! Hosts armed plugin triggers.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{RuntimeEvent, TriggerRequest};
use crate::plugin::{TriggerCallback, TriggerContext};

/// Run the trigger in `request` until `cancel` fires. Every fire becomes a
/// `TriggerFired` event; fires are dropped while the runtime channel is full.
pub fn spawn_trigger(
    request: TriggerRequest,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let trigger = request.trigger;
    let name = request.name.clone();

    let fire_name = name.clone();
    let callback = TriggerCallback::new(move || {
        if let Err(e) = runtime_tx.try_send(RuntimeEvent::TriggerFired { trigger }) {
            warn!(trigger = %fire_name, error = %e, "trigger fire dropped");
        } else {
            debug!(trigger = %fire_name, "trigger fired");
        }
    });

    let ctx = TriggerContext {
        name: request.name,
        parameters: request.parameters,
        callback,
        cancel,
    };
    let plugin = request.plugin;

    tokio::spawn(async move {
        info!(%trigger, trigger_name = %name, "trigger armed");
        match plugin.start(ctx).await {
            Ok(()) => debug!(%trigger, trigger_name = %name, "trigger stopped"),
            Err(err) => error!(%trigger, trigger_name = %name, error = %format!("{err:#}"), "trigger failed"),
        }
    })
}
