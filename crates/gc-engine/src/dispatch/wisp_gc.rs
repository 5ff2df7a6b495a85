// SPDX-License-Identifier: MIT

//! Wisp garbage collector: periodic sweep that purges expired closed work
//! items. Nil-guard tracker: [`WispGc::new`] returns `None` for a zero GC
//! interval, so a city that never wants GC pays no per-tick cost beyond
//! the `if let Some`.

use gc_adapters::beads::{BeadFilter, BeadStore};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::warn;

pub struct WispGc {
    interval: Duration,
    ttl: Duration,
    last_run_epoch_ms: RwLock<Option<u64>>,
}

impl WispGc {
    /// Returns `None` if `interval` is zero — a disabled GC.
    pub fn new(interval: Duration, ttl: Duration) -> Option<Self> {
        if interval.is_zero() {
            return None;
        }
        Some(Self {
            interval,
            ttl,
            last_run_epoch_ms: RwLock::new(None),
        })
    }

    pub fn should_run(&self, now_epoch_ms: u64) -> bool {
        match *self.last_run_epoch_ms.read() {
            None => true,
            Some(last) => now_epoch_ms.saturating_sub(last) >= self.interval.as_millis() as u64,
        }
    }

    /// Delete every closed `molecule` item older than `now - ttl`.
    /// Best-effort: one item's delete failure is skipped, not fatal, and
    /// does not stop the rest of the sweep.
    pub async fn run(&self, now_epoch_ms: u64, beads: &dyn BeadStore) -> usize {
        if !self.should_run(now_epoch_ms) {
            return 0;
        }
        *self.last_run_epoch_ms.write() = Some(now_epoch_ms);

        let cutoff = now_epoch_ms.saturating_sub(self.ttl.as_millis() as u64);
        let items = match beads
            .list(BeadFilter {
                bead_type: Some("molecule".to_string()),
                closed: Some(true),
                label: None,
            })
            .await
        {
            Ok(items) => items,
            Err(err) => {
                warn!(error = %err, "wisp gc: listing closed molecules failed, skipping this run");
                return 0;
            }
        };

        let mut deleted = 0;
        for item in items {
            if item.created_at_epoch_ms > cutoff {
                continue;
            }
            match beads.delete(&item.id).await {
                Ok(()) => deleted += 1,
                Err(err) => {
                    warn!(bead = %item.id, error = %err, "wisp gc: delete failed, skipping");
                }
            }
        }
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gc_adapters::FakeBeadStore;
    use gc_core::clock::FakeClock;

    #[test]
    fn zero_interval_disables_gc() {
        assert!(WispGc::new(Duration::ZERO, Duration::from_secs(60)).is_none());
    }

    #[tokio::test]
    async fn deletes_expired_closed_molecules_only() {
        let gc = WispGc::new(Duration::from_secs(1), Duration::from_secs(3600)).unwrap();
        let beads = FakeBeadStore::new(FakeClock::new(0));
        let old = beads.seed_closed("molecule", 0);
        let fresh = beads.seed_closed("molecule", 3_600_000);
        let other_type = beads.seed_closed("wisp", 0);

        let deleted = gc.run(3_600_001, &beads).await;
        assert_eq!(deleted, 1);

        let remaining: Vec<String> = beads
            .list(BeadFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert!(!remaining.contains(&old));
        assert!(remaining.contains(&fresh));
        assert!(remaining.contains(&other_type));
    }

    #[tokio::test]
    async fn respects_interval_between_runs() {
        let gc = WispGc::new(Duration::from_secs(3600), Duration::from_secs(0)).unwrap();
        let beads = FakeBeadStore::new(FakeClock::new(0));
        beads.seed_closed("molecule", 0);

        assert_eq!(gc.run(0, &beads).await, 1);
        beads.seed_closed("molecule", 0);
        assert_eq!(
            gc.run(1_000, &beads).await,
            0,
            "interval has not elapsed yet"
        );
        assert_eq!(gc.run(3_600_001, &beads).await, 1);
    }
}
