// SPDX-License-Identifier: MIT

//! In-process tracking of sessions currently draining. Draining state
//! lives only in memory — a daemon restart forgets it, same as the
//! running-set itself.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct DrainEntry {
    started_epoch_ms: u64,
    timeout: Duration,
}

/// Tracks which sessions are mid-drain, and since when.
#[derive(Default)]
pub struct DrainRegistry {
    entries: RwLock<HashMap<String, DrainEntry>>,
}

impl DrainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_draining(&self, name: &str, now_epoch_ms: u64, timeout: Duration) {
        self.entries.write().insert(
            name.to_string(),
            DrainEntry {
                started_epoch_ms: now_epoch_ms,
                timeout,
            },
        );
    }

    pub fn is_draining(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn clear(&self, name: &str) {
        self.entries.write().remove(name);
    }

    /// A drain is overdue once `now - started >= timeout`; the reconciler
    /// should stop the session unconditionally at that point instead of
    /// waiting for the agent to finish its current work unit.
    pub fn is_overdue(&self, name: &str, now_epoch_ms: u64) -> bool {
        match self.entries.read().get(name) {
            Some(entry) => {
                now_epoch_ms.saturating_sub(entry.started_epoch_ms) >= entry.timeout.as_millis() as u64
            }
            None => false,
        }
    }

    pub fn draining_names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}
