// SPDX-License-Identifier: MIT

//! Crash tracker: quarantines a session that keeps exiting in a tight loop
//! so the reconciler stops restarting it every tick. Nil-guard tracker:
//! [`CrashTracker::new`] returns `None` for a zero threshold — crash
//! quarantine disabled.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

pub struct CrashTracker {
    threshold: usize,
    window: Duration,
    last_running: RwLock<HashMap<String, bool>>,
    exits: RwLock<HashMap<String, VecDeque<u64>>>,
}

impl CrashTracker {
    /// Returns `None` if `threshold` is zero — crash quarantine disabled.
    pub fn new(threshold: usize, window: Duration) -> Option<Self> {
        if threshold == 0 {
            return None;
        }
        Some(Self {
            threshold,
            window,
            last_running: RwLock::new(HashMap::new()),
            exits: RwLock::new(HashMap::new()),
        })
    }

    /// Observe the current running state of `identity` this tick. Records
    /// an exit timestamp on every running-to-not-running transition and
    /// prunes exits that have aged out of the tracking window.
    pub fn observe(&self, identity: &str, is_running: bool, now_epoch_ms: u64) {
        let was_running = self
            .last_running
            .write()
            .insert(identity.to_string(), is_running)
            .unwrap_or(false);

        if was_running && !is_running {
            let mut exits = self.exits.write();
            let entry = exits.entry(identity.to_string()).or_default();
            entry.push_back(now_epoch_ms);
            self.prune(entry, now_epoch_ms);
        }
    }

    fn prune(&self, entry: &mut VecDeque<u64>, now_epoch_ms: u64) {
        let window_ms = self.window.as_millis() as u64;
        while let Some(&oldest) = entry.front() {
            if now_epoch_ms.saturating_sub(oldest) > window_ms {
                entry.pop_front();
            } else {
                break;
            }
        }
    }

    /// True if `identity` has exceeded its crash threshold within the
    /// tracking window. Quarantine lasts exactly one tick: calling this
    /// consumes the recorded exits down to the single most recent one, so
    /// the next tick's count starts back below threshold.
    pub fn should_skip_start(&self, identity: &str, now_epoch_ms: u64) -> bool {
        let mut exits = self.exits.write();
        let Some(entry) = exits.get_mut(identity) else {
            return false;
        };
        self.prune(entry, now_epoch_ms);
        if entry.len() < self.threshold {
            return false;
        }
        let most_recent = entry.back().copied();
        entry.clear();
        if let Some(ts) = most_recent {
            entry.push_back(ts);
        }
        true
    }

    /// Forget all tracked state for `identity`, e.g. after it has been
    /// removed from desired state or explicitly restarted by an operator.
    pub fn clear(&self, identity: &str) {
        self.last_running.write().remove(identity);
        self.exits.write().remove(identity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threshold_disables_quarantine() {
        assert!(CrashTracker::new(0, Duration::from_secs(60)).is_none());
    }

    #[test]
    fn quarantines_after_threshold_exits_in_window() {
        let tracker = CrashTracker::new(3, Duration::from_secs(60)).unwrap();
        let id = "gc-x-worker-1";

        tracker.observe(id, true, 0);
        tracker.observe(id, false, 1_000);
        assert!(!tracker.should_skip_start(id, 1_000));

        tracker.observe(id, true, 2_000);
        tracker.observe(id, false, 3_000);
        assert!(!tracker.should_skip_start(id, 3_000));

        tracker.observe(id, true, 4_000);
        tracker.observe(id, false, 5_000);
        assert!(tracker.should_skip_start(id, 5_000));
    }

    #[test]
    fn quarantine_lasts_exactly_one_tick() {
        let tracker = CrashTracker::new(2, Duration::from_secs(60)).unwrap();
        let id = "gc-x-worker-1";

        tracker.observe(id, true, 0);
        tracker.observe(id, false, 1_000);
        tracker.observe(id, true, 2_000);
        tracker.observe(id, false, 3_000);

        assert!(tracker.should_skip_start(id, 3_000));
        assert!(
            !tracker.should_skip_start(id, 3_000),
            "quarantine should clear after being consumed"
        );
    }

    #[test]
    fn exits_outside_window_do_not_count() {
        let tracker = CrashTracker::new(2, Duration::from_secs(10)).unwrap();
        let id = "gc-x-worker-1";

        tracker.observe(id, true, 0);
        tracker.observe(id, false, 1_000);
        tracker.observe(id, true, 20_000);
        tracker.observe(id, false, 21_000);

        assert!(!tracker.should_skip_start(id, 21_000));
    }

    #[test]
    fn clear_forgets_tracked_state() {
        let tracker = CrashTracker::new(1, Duration::from_secs(60)).unwrap();
        let id = "gc-x-worker-1";

        tracker.observe(id, true, 0);
        tracker.observe(id, false, 1_000);
        assert!(tracker.should_skip_start(id, 1_000));

        tracker.clear(id);
        assert!(!tracker.should_skip_start(id, 1_000));
    }
}
