// src/exec/locks.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Process-wide named locks for `thread_locked` jobs.
///
/// Checks sharing a lock name never run at the same time. The lock is a
/// tokio mutex so a waiting check can still be cancelled.
#[derive(Debug, Clone, Default)]
pub struct NamedLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl NamedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(name.to_string()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_same_lock() {
        let locks = NamedLocks::new();
        assert!(Arc::ptr_eq(&locks.get("db"), &locks.clone().get("db")));
        assert!(!Arc::ptr_eq(&locks.get("db"), &locks.get("disk")));
    }
}
