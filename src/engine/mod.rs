// src/engine/mod.rs

//! Orchestration engine for logictree.
//!
//! This module ties together:
//! - the run scheduler acting on the [`crate::tree::Tree`]
//! - the event cascade that keeps ancestors consistent
//! - the main runtime event loop that reacts to:
//!   - check progress, completion and faults
//!   - trigger fires
//!   - user run/break/reset requests
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::time::Duration;

use crate::plugin::{CheckFault, CheckOutcome, CheckProgress};
use crate::tree::snapshot::TreeDocument;
use crate::tree::{NodeIndex, RunLimits, WorkerId};
use crate::trigger::TriggerId;

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// If true, exit the runtime once the root finished and nothing is
    /// running or waiting (used for `--once`).
    pub exit_when_idle: bool,
    pub limits: RunLimits,
}

impl RuntimeOptions {
    pub fn retry_interval(&self) -> Duration {
        self.limits.retry_interval
    }
}

/// Events flowing into the runtime from check threads, triggers, the user,
/// and timers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Run a node (used to seed the root at startup).
    Run { node: NodeIndex },
    /// User-initiated run: resets the node first and ignores `UserAbort`.
    UserRun { node: NodeIndex },
    /// User-initiated break.
    UserBreak { node: NodeIndex },
    Reset { node: NodeIndex },
    CheckProgress {
        node: NodeIndex,
        generation: u64,
        progress: CheckProgress,
    },
    CheckCompleted {
        node: NodeIndex,
        generation: u64,
        outcome: CheckOutcome,
    },
    CheckFaulted {
        node: NodeIndex,
        generation: u64,
        fault: CheckFault,
    },
    /// A plugin trigger fired.
    TriggerFired { trigger: TriggerId },
    /// A gated start is retried.
    RetryRun { node: NodeIndex },
    /// Next round of a looping list.
    DelayedRun { node: NodeIndex },
    SnapshotLoaded {
        node: NodeIndex,
        generation: u64,
        document: Result<Box<TreeDocument>, String>,
    },
    WorkerFinished { worker: WorkerId, sender: NodeIndex },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

impl RuntimeEvent {
    /// Events that only ask for new work; dropped while the tree is flushing.
    ///
    /// Gate retries and loop rounds continue work already in flight and
    /// always pass.
    pub fn is_run_request(&self) -> bool {
        matches!(
            self,
            RuntimeEvent::Run { .. } | RuntimeEvent::UserRun { .. } | RuntimeEvent::TriggerFired { .. }
        )
    }
}

pub mod core;
pub mod event_handlers;
pub mod mode;
pub mod runtime;
pub mod scheduler;

pub use core::CoreRuntime;
pub use event_handlers::{
    CheckRequest, CoreCommand, CoreStep, Notification, TriggerRequest, WorkerRequest,
};
pub use mode::{SchedulingMode, TreeControl};
pub use runtime::Runtime;
pub use scheduler::{BreakReason, Gate, RunContext};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuations_are_not_run_requests() {
        let node = NodeIndex(3);
        assert!(RuntimeEvent::Run { node }.is_run_request());
        assert!(RuntimeEvent::UserRun { node }.is_run_request());
        assert!(RuntimeEvent::TriggerFired { trigger: TriggerId(0) }.is_run_request());
        assert!(!RuntimeEvent::RetryRun { node }.is_run_request());
        assert!(!RuntimeEvent::DelayedRun { node }.is_run_request());
        assert!(!RuntimeEvent::UserBreak { node }.is_run_request());
    }
}
