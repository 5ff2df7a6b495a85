// SPDX-License-Identifier: MIT

//! Append-only JSONL event log. Every `controller.*`, `agent.*`,
//! `automation.fired`, and `bead.*` record the lifecycle coordinator and
//! reconciler emit lands here, in a fixed on-disk shape:
//! `{type, ts: RFC-3339, actor, subject, message, payload?, seq}`.
//!
//! `gc-core::EventRecord` keeps timestamps as epoch milliseconds internally
//! (cheap to compare, no timezone parsing on the hot path); this module is
//! the seam that renders that internal shape into the wire format on write.
//! The log is buffered and flushed on every append, with no replay path —
//! the controller's authoritative state is always rederived from the
//! session provider and config, never from this log.

use chrono::{DateTime, Utc};
use gc_core::event::{EventKind, EventRecord};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// How many recent records [`EventLog::events_since`] can look back through.
/// Event-gated automations only ever need to see what's landed since their
/// last tick, so this trails far behind any realistic dispatch cadence.
const RECENT_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("opening event log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writing event log record: {0}")]
    Write(std::io::Error),
    #[error("serializing event record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// On-disk record shape.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct WireRecord {
    #[serde(rename = "type")]
    kind: EventKind,
    ts: String,
    actor: String,
    subject: String,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<serde_json::Value>,
    seq: u64,
}

fn to_wire(record: &EventRecord) -> WireRecord {
    let ts = DateTime::<Utc>::from_timestamp_millis(record.ts_epoch_ms as i64)
        .unwrap_or_else(Utc::now)
        .to_rfc3339();
    WireRecord {
        kind: record.kind,
        ts,
        actor: record.actor.clone(),
        subject: record.subject.clone(),
        message: record.message.clone(),
        payload: record.payload.clone(),
        seq: record.seq,
    }
}

/// Append-only handle to `<city>/.<state-dir>/events.jsonl`.
pub struct EventLog {
    file: Mutex<File>,
    next_seq: AtomicU64,
    recent: Mutex<VecDeque<(u64, EventKind, String)>>,
}

impl EventLog {
    /// Open (creating if absent) and recover the next sequence number from
    /// the last line already on disk, so a restart doesn't reuse sequence
    /// numbers an event-gated automation may have already observed.
    pub fn open(path: &Path) -> Result<Self, EventLogError> {
        let last_seq = Self::recover_last_seq(path);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| EventLogError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            file: Mutex::new(file),
            next_seq: AtomicU64::new(last_seq + 1),
            recent: Mutex::new(VecDeque::new()),
        })
    }

    fn recover_last_seq(path: &Path) -> u64 {
        let Ok(file) = File::open(path) else {
            return 0;
        };
        let reader = BufReader::new(file);
        let mut last = 0;
        for line in reader.lines().map_while(Result::ok) {
            if let Ok(record) = serde_json::from_str::<WireRecord>(&line) {
                last = record.seq;
            }
        }
        last
    }

    /// Append one record, stamping it with the next sequence number and
    /// `now_epoch_ms` (threaded in by the caller, never read from the wall
    /// clock here, for the same determinism reasons as the builder's
    /// beacon timestamp).
    pub fn append(
        &self,
        kind: EventKind,
        actor: &str,
        subject: &str,
        message: &str,
        payload: Option<serde_json::Value>,
        now_epoch_ms: u64,
    ) -> Result<u64, EventLogError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let record = EventRecord {
            kind,
            ts_epoch_ms: now_epoch_ms,
            actor: actor.to_string(),
            subject: subject.to_string(),
            message: message.to_string(),
            payload,
            seq,
        };
        let line = serde_json::to_string(&to_wire(&record))?;

        {
            let mut file = self.file.lock();
            writeln!(file, "{line}").map_err(EventLogError::Write)?;
            file.flush().map_err(EventLogError::Write)?;
        }

        let mut recent = self.recent.lock();
        recent.push_back((seq, kind, subject.to_string()));
        if recent.len() > RECENT_CAPACITY {
            recent.pop_front();
        }

        Ok(seq)
    }

    /// Monotone sequence number of the most recently appended record. Used
    /// as the cursor event-gated automations compare against.
    pub fn latest_seq(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst).saturating_sub(1)
    }

    /// Every record with `seq > seq`, as `(seq, kind, subject)`, drawn from
    /// the in-memory tail kept alongside the file. Bounded by
    /// [`RECENT_CAPACITY`]; a gate that falls further behind than that sees
    /// an empty result rather than every event it missed.
    pub fn events_since(&self, seq: u64) -> Vec<(u64, EventKind, String)> {
        self.recent
            .lock()
            .iter()
            .filter(|(s, _, _)| *s > seq)
            .cloned()
            .collect()
    }
}

impl gc_engine::dispatch::automation::EventCursor for EventLog {
    fn latest_seq(&self) -> u64 {
        EventLog::latest_seq(self)
    }

    fn events_since(&self, seq: u64) -> Vec<(u64, EventKind, String)> {
        EventLog::events_since(self, seq)
    }
}
