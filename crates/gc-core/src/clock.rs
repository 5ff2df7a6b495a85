// SPDX-License-Identifier: MIT

//! Time abstraction so the builder and dispatchers can be driven by a fixed
//! instant in tests instead of wall-clock time.
//!
//! `now` must be captured once per tick and threaded through, never
//! recomputed inside the builder — otherwise the rendered beacon prompt, and
//! therefore the fingerprint, would drift every tick even when nothing else
//! changed.

use std::time::{SystemTime, UNIX_EPOCH};

/// A source of the current time. Implementations must be cheap to call —
/// the reconcile loop calls this once per tick.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_epoch_ms(&self) -> u64;
}

/// Real wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock fixed at construction time, advanced explicitly. Used by tests
/// that need deterministic cron/cooldown gate evaluation.
#[derive(Debug, Clone)]
pub struct FakeClock {
    epoch_ms: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl FakeClock {
    pub fn new(epoch_ms: u64) -> Self {
        Self {
            epoch_ms: std::sync::Arc::new(std::sync::atomic::AtomicU64::new(epoch_ms)),
        }
    }

    pub fn advance_ms(&self, delta: u64) {
        self.epoch_ms
            .fetch_add(delta, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set_ms(&self, value: u64) {
        self.epoch_ms.store(value, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_epoch_ms(&self) -> u64 {
        self.epoch_ms.load(std::sync::atomic::Ordering::SeqCst)
    }
}
