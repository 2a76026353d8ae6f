// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated tree
//! - a list of "commands" describing what the IO shell should do next
//! - the node notifications the cascade published on the way
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - handing checks, workers and triggers to the executor
//! - timers, Ctrl+C and shutdown
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, or processes.

use tracing::info;

use crate::engine::event_handlers::{handle_event, should_exit, CoreCommand, CoreStep};
use crate::engine::{RuntimeEvent, RuntimeOptions};
use crate::tree::Tree;

/// Pure core runtime state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    tree: Tree,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(mut tree: Tree, options: RuntimeOptions) -> Self {
        tree.set_limits(options.limits);
        Self { tree, options }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn into_tree(self) -> Tree {
        self.tree
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Expose whether nothing is running or waiting (for tests).
    pub fn is_idle(&self) -> bool {
        self.tree.is_idle()
    }

    /// Handle a single runtime event, updating the tree and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        let shutdown = matches!(event, RuntimeEvent::ShutdownRequested);

        handle_event(&mut self.tree, event);
        self.tree.settle();

        if shutdown {
            self.tree.shutdown();
        }

        let outbox = self.tree.take_outbox();
        let mut commands = outbox.commands;
        let mut keep_running = !shutdown;

        if keep_running && should_exit(&self.tree, &self.options) {
            info!(root = %self.tree.path(self.tree.root()), "root finished; exiting");
            keep_running = false;
            commands.push(CoreCommand::RequestExit);
        }

        CoreStep {
            commands,
            notifications: outbox.notifications,
            keep_running,
        }
    }
}
