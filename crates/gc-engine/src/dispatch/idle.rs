// SPDX-License-Identifier: MIT

//! Idle tracker: accumulates per-session idle time and flags sessions that
//! have exceeded their configured idle timeout so the reconciler can stop
//! them. Nil-guard tracker: [`IdleTracker::new`] returns `None` for a zero
//! timeout.
//!
//! The session-provider capability set has no native "is this agent idle"
//! signal, only `is-running`. The controller can only observe that a
//! session reached steady state this tick (running, no fingerprint drift);
//! this tracker measures how long a session has stayed in that steady
//! state, which is the idle-time proxy the reconciler drives it with.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

pub struct IdleTracker {
    timeout: Duration,
    idle_since_epoch_ms: RwLock<HashMap<String, u64>>,
}

impl IdleTracker {
    /// Returns `None` if `timeout` is zero — idle tracking disabled.
    pub fn new(timeout: Duration) -> Option<Self> {
        if timeout.is_zero() {
            return None;
        }
        Some(Self {
            timeout,
            idle_since_epoch_ms: RwLock::new(HashMap::new()),
        })
    }

    /// Record that `identity` was observed in steady state at `now`. The
    /// idle clock starts on first observation and keeps running until
    /// [`note_touched`] resets it.
    pub fn note_steady(&self, identity: &str, now_epoch_ms: u64) {
        self.idle_since_epoch_ms
            .write()
            .entry(identity.to_string())
            .or_insert(now_epoch_ms);
    }

    /// Record that `identity` was started, restarted, or stopped this
    /// tick — its activity state changed, so idle tracking resets.
    pub fn note_touched(&self, identity: &str) {
        self.idle_since_epoch_ms.write().remove(identity);
    }

    /// Identities whose idle clock has exceeded the configured timeout.
    pub fn expired(&self, now_epoch_ms: u64) -> Vec<String> {
        self.idle_since_epoch_ms
            .read()
            .iter()
            .filter(|(_, &since)| {
                now_epoch_ms.saturating_sub(since) >= self.timeout.as_millis() as u64
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_disables_tracking() {
        assert!(IdleTracker::new(Duration::ZERO).is_none());
    }

    #[test]
    fn steady_session_expires_after_timeout() {
        let tracker = IdleTracker::new(Duration::from_secs(60)).unwrap();
        tracker.note_steady("gc-x-worker-1", 0);
        assert!(tracker.expired(30_000).is_empty());
        assert_eq!(tracker.expired(60_000), vec!["gc-x-worker-1".to_string()]);
    }

    #[test]
    fn touch_resets_idle_clock() {
        let tracker = IdleTracker::new(Duration::from_secs(60)).unwrap();
        tracker.note_steady("gc-x-worker-1", 0);
        tracker.note_touched("gc-x-worker-1");
        tracker.note_steady("gc-x-worker-1", 59_000);
        assert!(tracker.expired(90_000).is_empty());
    }

    #[test]
    fn first_observation_wins_not_subsequent_ones() {
        let tracker = IdleTracker::new(Duration::from_secs(60)).unwrap();
        tracker.note_steady("gc-x-worker-1", 0);
        tracker.note_steady("gc-x-worker-1", 30_000);
        assert_eq!(tracker.expired(60_000), vec!["gc-x-worker-1".to_string()]);
    }
}
