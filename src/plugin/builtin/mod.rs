// src/plugin/builtin/mod.rs

//! Plugins available without any manifest on disk.
//!
//! | kind    | names                                   |
//! |---------|-----------------------------------------|
//! | checker | `constant`, `command`, `file_exists`    |
//! | trigger | `interval`, `file_watch`                |
//! | worker  | `command`, `log`                        |
//! | logger  | `tracing`                               |

pub mod checkers;
pub mod command;
pub mod loggers;
pub mod triggers;
pub mod workers;

use std::sync::Arc;

use crate::fs::FileSystem;
use crate::plugin::PluginRegistry;

pub fn register_builtins(registry: &mut PluginRegistry, fs: Arc<dyn FileSystem>) {
    registry.register_checker("constant", Arc::new(checkers::ConstantChecker));
    registry.register_checker("command", Arc::new(command::CommandChecker));
    registry.register_checker(
        "file_exists",
        Arc::new(checkers::FileExistsChecker::new(Arc::clone(&fs))),
    );

    registry.register_trigger("interval", Arc::new(triggers::IntervalTrigger));
    registry.register_trigger("file_watch", Arc::new(triggers::FileWatchTrigger::new(fs)));

    registry.register_worker("command", Arc::new(command::CommandWorker));
    registry.register_worker("log", Arc::new(workers::LogWorker));

    registry.register_logger("tracing", Arc::new(loggers::TracingLogger));
}
