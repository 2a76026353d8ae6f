// src/plugin/builtin/workers.rs

use anyhow::Result;
use tracing::info;

use crate::plugin::{PluginFuture, Worker, WorkerContext};

/// `log`: writes the triggering event at info level, prefixed by the
/// parameters.
#[derive(Debug, Default)]
pub struct LogWorker;

impl Worker for LogWorker {
    fn exec(&self, ctx: WorkerContext) -> PluginFuture<'_, Result<()>> {
        Box::pin(async move {
            info!(
                node = %ctx.node_id,
                event = %ctx.event.name,
                source = %ctx.event.source,
                logical = %ctx.event.logical,
                resetting = ctx.resetting,
                "{}",
                ctx.parameters
            );
            Ok(())
        })
    }
}
