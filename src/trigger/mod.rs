// src/trigger/mod.rs

//! Trigger gating.

pub mod shell;

pub use shell::{GateChange, TriggerClient, TriggerId, TriggerShell, TriggerSource};
