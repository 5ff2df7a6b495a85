// SPDX-License-Identifier: MIT

//! Event stream record type: the append-only log of typed, timestamped
//! records the controller writes and event-gated automations read.

use std::fmt;

/// A dotted event type name. Kept as a closed enum (rather than a bare
/// `String`) so call sites can't typo a type name, while `Display` renders
/// exactly the dotted form the event log and automation event-gates expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ControllerStarted,
    ControllerStopped,
    AgentStarted,
    AgentStopped,
    AgentRestarted,
    AgentDrainStarted,
    SessionOrphanStopped,
    AutomationFired,
    BeadCreated,
    BeadClosed,
    BeadUpdated,
    ConfigReloaded,
    ConfigReloadRejected,
}

impl EventKind {
    fn from_dotted(s: &str) -> Option<Self> {
        Some(match s {
            "controller.started" => EventKind::ControllerStarted,
            "controller.stopped" => EventKind::ControllerStopped,
            "agent.started" => EventKind::AgentStarted,
            "agent.stopped" => EventKind::AgentStopped,
            "agent.restarted" => EventKind::AgentRestarted,
            "agent.drain_started" => EventKind::AgentDrainStarted,
            "session.orphan_stopped" => EventKind::SessionOrphanStopped,
            "automation.fired" => EventKind::AutomationFired,
            "bead.created" => EventKind::BeadCreated,
            "bead.closed" => EventKind::BeadClosed,
            "bead.updated" => EventKind::BeadUpdated,
            "config.reloaded" => EventKind::ConfigReloaded,
            "config.reload_rejected" => EventKind::ConfigReloadRejected,
            _ => return None,
        })
    }
}

// Serialized as the dotted `Display` form (e.g. "agent.started") rather than
// the derived PascalCase variant name, since that dotted form is the wire
// shape the event log and event-gated automations key off of.
impl serde::Serialize for EventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for EventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EventKind::from_dotted(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown event type: {s}")))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::ControllerStarted => "controller.started",
            EventKind::ControllerStopped => "controller.stopped",
            EventKind::AgentStarted => "agent.started",
            EventKind::AgentStopped => "agent.stopped",
            EventKind::AgentRestarted => "agent.restarted",
            EventKind::AgentDrainStarted => "agent.drain_started",
            EventKind::SessionOrphanStopped => "session.orphan_stopped",
            EventKind::AutomationFired => "automation.fired",
            EventKind::BeadCreated => "bead.created",
            EventKind::BeadClosed => "bead.closed",
            EventKind::BeadUpdated => "bead.updated",
            EventKind::ConfigReloaded => "config.reloaded",
            EventKind::ConfigReloadRejected => "config.reload_rejected",
        };
        write!(f, "{s}")
    }
}

/// One append-only, typed, timestamped record.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub ts_epoch_ms: u64,
    pub actor: String,
    pub subject: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub seq: u64,
}

impl EventRecord {
    /// Build a record; `seq` is assigned by the event log on append, so this
    /// constructor takes a placeholder of `0` that callers never observe.
    pub fn new(
        kind: EventKind,
        actor: impl Into<String>,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            ts_epoch_ms: 0,
            actor: actor.into(),
            subject: subject.into(),
            message: message.into(),
            payload: None,
            seq: 0,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}
