// SPDX-License-Identifier: MIT

//! Automation: a scheduled work-item factory. Gated by cron schedule,
//! cooldown interval, event subscription, or manual-only; the dispatcher
//! evaluates these gates once per reconcile tick.

use std::time::Duration;

/// Where an automation is declared: the city as a whole, or a single rig.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AutomationScope {
    City,
    Rig(String),
}

/// What triggers an automation to fire.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AutomationGate {
    /// Fires when now crosses the next scheduled instant since last-run.
    Cron { schedule: String },
    /// Fires when `now - last-run >= interval`.
    #[serde(with = "cooldown_secs")]
    Cooldown { interval: Duration },
    /// Fires when the event sequence has advanced past the stored cursor
    /// and matches the subscription filter.
    Event { subscription: String },
    /// Never auto-fires.
    Manual,
}

impl AutomationGate {
    pub fn is_manual(&self) -> bool {
        matches!(self, AutomationGate::Manual)
    }
}

mod cooldown_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct Repr {
        interval_secs: u64,
    }

    pub fn serialize<S: Serializer>(interval: &Duration, s: S) -> Result<S::Ok, S::Error> {
        Repr {
            interval_secs: interval.as_secs(),
        }
        .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let repr = Repr::deserialize(d)?;
        Ok(Duration::from_secs(repr.interval_secs))
    }
}

/// A scheduled work-item factory.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Automation {
    pub name: String,
    pub scope: AutomationScope,
    pub gate: AutomationGate,
    pub formula: String,
    pub target_pool: Option<String>,
}

impl Automation {
    /// `<name>` for city automations, `<name>:rig:<rig>` for rig automations.
    pub fn scoped_name(&self) -> String {
        match &self.scope {
            AutomationScope::City => self.name.clone(),
            AutomationScope::Rig(rig) => format!("{}:rig:{}", self.name, rig),
        }
    }

    /// Qualify this automation's target pool label as `<rig>/<pool>` for
    /// rig-scoped automations, or bare `<pool>` for city automations.
    pub fn qualified_pool_label(&self) -> Option<String> {
        let pool = self.target_pool.as_ref()?;
        match &self.scope {
            AutomationScope::City => Some(pool.clone()),
            AutomationScope::Rig(rig) => Some(format!("{rig}/{pool}")),
        }
    }
}
