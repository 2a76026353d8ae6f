// src/engine/mode.rs

//! Tree-wide scheduling mode.
//!
//! The mode is read atomically by the runtime loop and by check threads.
//! `Paused` holds new work back until resumed; `Flushing` drops run requests
//! so in-flight work can drain.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tracing::info;

const POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingMode {
    Running,
    Paused,
    Flushing,
}

impl SchedulingMode {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SchedulingMode::Paused,
            2 => SchedulingMode::Flushing,
            _ => SchedulingMode::Running,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SchedulingMode::Running => 0,
            SchedulingMode::Paused => 1,
            SchedulingMode::Flushing => 2,
        }
    }
}

/// Cloneable handle to the scheduling mode.
#[derive(Debug, Clone, Default)]
pub struct TreeControl {
    mode: Arc<AtomicU8>,
}

impl TreeControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> SchedulingMode {
        SchedulingMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    fn set(&self, mode: SchedulingMode) {
        let old = SchedulingMode::from_u8(self.mode.swap(mode.as_u8(), Ordering::AcqRel));
        if old != mode {
            info!(from = ?old, to = ?mode, "scheduling mode changed");
        }
    }

    pub fn pause(&self) {
        self.set(SchedulingMode::Paused);
    }

    pub fn resume(&self) {
        self.set(SchedulingMode::Running);
    }

    pub fn flush(&self) {
        self.set(SchedulingMode::Flushing);
    }

    pub fn is_paused(&self) -> bool {
        self.mode() == SchedulingMode::Paused
    }

    pub fn is_flushing(&self) -> bool {
        self.mode() == SchedulingMode::Flushing
    }

    pub async fn wait_while_paused(&self) {
        while self.is_paused() {
            tokio::time::sleep(POLL).await;
        }
    }

    /// Blocking variant for dedicated check threads.
    pub fn wait_while_paused_blocking(&self) {
        while self.is_paused() {
            std::thread::sleep(POLL);
        }
    }
}
