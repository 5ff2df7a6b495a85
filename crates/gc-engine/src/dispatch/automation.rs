// SPDX-License-Identifier: MIT

//! Automation dispatcher. Follows the nil-guard tracker pattern:
//! [`AutomationDispatcher::new`] returns `None` when there is nothing to
//! dispatch, so callers can skip the whole subsystem with one
//! `if let Some(dispatcher) = ...`.

use chrono::{DateTime, Utc};
use gc_adapters::beads::{BeadStore, BeadStoreError};
use gc_core::automation::{Automation, AutomationGate};
use gc_core::event::EventKind;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Read-only view of the event log, used by event-gated automations.
/// Implemented by whatever owns the event log (the daemon); kept abstract
/// here so this crate doesn't depend on it.
pub trait EventCursor: Send + Sync {
    fn latest_seq(&self) -> u64;

    /// Every record appended after `seq`, as `(seq, kind, subject)`. Used
    /// to check an event gate's subscription filter, not just whether the
    /// sequence moved.
    fn events_since(&self, seq: u64) -> Vec<(u64, EventKind, String)>;
}

pub struct AutomationDispatcher {
    automations: Vec<Automation>,
    last_run_epoch_ms: RwLock<BTreeMap<String, u64>>,
    last_seen_seq: RwLock<BTreeMap<String, u64>>,
}

impl AutomationDispatcher {
    /// Returns `None` if every configured automation is manual (nothing
    /// ever auto-fires), matching the nil-guard pattern.
    pub fn new(automations: Vec<Automation>) -> Option<Self> {
        let active: Vec<Automation> = automations.into_iter().filter(|a| !a.gate.is_manual()).collect();
        if active.is_empty() {
            return None;
        }
        Some(Self {
            automations: active,
            last_run_epoch_ms: RwLock::new(BTreeMap::new()),
            last_seen_seq: RwLock::new(BTreeMap::new()),
        })
    }

    /// Evaluate every automation's gate and fire the ones that are due.
    /// Best-effort: one automation's failure doesn't stop the rest. Returns
    /// the number of automations actually dispatched.
    pub async fn dispatch(
        &self,
        now_epoch_ms: u64,
        event_cursor: &dyn EventCursor,
        beads: &dyn BeadStore,
    ) -> usize {
        let mut dispatched = 0;

        for automation in &self.automations {
            let scoped = automation.scoped_name();
            let due = self.is_due(automation, &scoped, now_epoch_ms, event_cursor);
            if !due {
                continue;
            }

            match self.fire(automation, now_epoch_ms, event_cursor, beads).await {
                Ok(()) => {
                    dispatched += 1;
                    self.last_run_epoch_ms.write().insert(scoped, now_epoch_ms);
                }
                Err(err) => {
                    warn!(automation = %scoped, error = %err, "automation dispatch failed");
                }
            }
        }

        dispatched
    }

    fn is_due(
        &self,
        automation: &Automation,
        scoped: &str,
        now_epoch_ms: u64,
        event_cursor: &dyn EventCursor,
    ) -> bool {
        match &automation.gate {
            AutomationGate::Manual => false,
            AutomationGate::Cooldown { interval } => self.cooldown_due(scoped, *interval, now_epoch_ms),
            AutomationGate::Cron { schedule } => self.cron_due(scoped, schedule, now_epoch_ms),
            AutomationGate::Event { subscription } => self.event_due(scoped, subscription, event_cursor),
        }
    }

    fn cooldown_due(&self, scoped: &str, interval: Duration, now_epoch_ms: u64) -> bool {
        match self.last_run_epoch_ms.read().get(scoped) {
            Some(last) => now_epoch_ms.saturating_sub(*last) >= interval.as_millis() as u64,
            None => true,
        }
    }

    fn cron_due(&self, scoped: &str, schedule: &str, now_epoch_ms: u64) -> bool {
        let parsed = match cron::Schedule::from_str(schedule) {
            Ok(schedule) => schedule,
            Err(err) => {
                warn!(automation = %scoped, schedule, error = %err, "invalid cron schedule, skipping");
                return false;
            }
        };
        let last = self
            .last_run_epoch_ms
            .read()
            .get(scoped)
            .copied()
            .unwrap_or(0);
        let Some(last_instant) = epoch_ms_to_utc(last) else {
            return false;
        };
        let Some(next) = parsed.after(&last_instant).next() else {
            return false;
        };
        let Some(now) = epoch_ms_to_utc(now_epoch_ms) else {
            return false;
        };
        next <= now
    }

    /// Fires when the event sequence has advanced past the stored cursor
    /// *and* at least one of the newly observed events matches
    /// `subscription`. Advances the cursor past every observed event
    /// regardless of match, so a burst containing no matching event isn't
    /// re-scanned on the next tick.
    fn event_due(&self, scoped: &str, subscription: &str, event_cursor: &dyn EventCursor) -> bool {
        let stored = *self.last_seen_seq.read().get(scoped).unwrap_or(&0);
        let events = event_cursor.events_since(stored);
        if events.is_empty() {
            return false;
        }

        let max_seq = events.iter().map(|(seq, _, _)| *seq).max().unwrap_or(stored);
        self.last_seen_seq.write().insert(scoped.to_string(), max_seq);

        events.iter().any(|(_, kind, _)| kind.to_string() == subscription)
    }

    async fn fire(
        &self,
        automation: &Automation,
        now_epoch_ms: u64,
        event_cursor: &dyn EventCursor,
        beads: &dyn BeadStore,
    ) -> Result<(), BeadStoreError> {
        let scoped = automation.scoped_name();
        let mut labels = BTreeMap::new();
        labels.insert(format!("automation-run:{scoped}"), now_epoch_ms.to_string());
        if matches!(automation.gate, AutomationGate::Event { .. }) {
            labels.insert("automation".to_string(), scoped.clone());
            labels.insert("seq".to_string(), event_cursor.latest_seq().to_string());
        }
        if let Some(pool_label) = automation.qualified_pool_label() {
            labels.insert("pool".to_string(), pool_label);
        }

        beads.create("wisp", &automation.formula, labels).await?;
        Ok(())
    }
}

fn epoch_ms_to_utc(epoch_ms: u64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(epoch_ms as i64)
}
