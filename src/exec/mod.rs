// src/exec/mod.rs

//! Plugin execution layer.
//!
//! This module runs the work the core asks for and reports back to the
//! orchestration runtime via `RuntimeEvent`s.
//!
//! - [`check_thread`] runs one check on its own OS thread.
//! - [`worker_runner`] runs one worker execution on the tokio pool.
//! - [`trigger_host`] keeps armed triggers alive until they are disarmed.
//! - [`locks`] holds the named locks of `thread_locked` jobs.
//! - [`backend`] provides the `ExecutorBackend` trait and a concrete
//!   `RealExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod backend;
pub mod check_thread;
pub mod locks;
pub mod trigger_host;
pub mod worker_runner;

pub use backend::{BackendFuture, ExecutorBackend, RealExecutorBackend};
pub use locks::NamedLocks;
