// src/plugin/builtin/loggers.rs

use tracing::info;

use crate::plugin::{LogEntry, TreeLogger};

/// `tracing`: forwards accepted events to the process log.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl TreeLogger for TracingLogger {
    fn log(&self, entry: &LogEntry) {
        info!(
            target: "logictree::events",
            logger = %entry.logger,
            seq = entry.event.seq,
            event = %entry.event.name,
            source = %entry.event.source,
            sender = %entry.event.sender,
            path = %entry.event.path,
            logical = %entry.event.logical,
            logical_state = %entry.event.logical_state,
            at = %entry.timestamp.to_rfc3339(),
            "tree event"
        );
    }
}
