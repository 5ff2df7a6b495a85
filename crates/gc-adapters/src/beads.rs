// SPDX-License-Identifier: MIT

//! The bead-store capability set: work-item creation, labeling, listing,
//! and deletion. The controller never interprets bead content — it only
//! creates work items from automation formulas, labels them, and
//! garbage-collects closed wisps.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BeadStoreError {
    #[error("bead store unavailable: {0}")]
    Unavailable(String),
    #[error("bead not found: {0}")]
    NotFound(String),
    #[error("create failed: {0}")]
    CreateFailed(String),
    #[error("list failed: {0}")]
    ListFailed(String),
}

/// A work item as the controller sees it: opaque payload plus the labels
/// the controller itself cares about (type, closed-at).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeadItem {
    pub id: String,
    pub bead_type: String,
    pub labels: BTreeMap<String, String>,
    pub closed: bool,
    pub created_at_epoch_ms: u64,
}

/// Filter passed to `BeadStore::list`. `None` fields are unconstrained.
#[derive(Debug, Clone, Default)]
pub struct BeadFilter {
    pub bead_type: Option<String>,
    pub closed: Option<bool>,
    pub label: Option<(String, String)>,
}

impl BeadFilter {
    pub fn matches(&self, item: &BeadItem) -> bool {
        if let Some(bead_type) = &self.bead_type {
            if &item.bead_type != bead_type {
                return false;
            }
        }
        if let Some(closed) = self.closed {
            if item.closed != closed {
                return false;
            }
        }
        if let Some((key, value)) = &self.label {
            if item.labels.get(key) != Some(value) {
                return false;
            }
        }
        true
    }
}

/// Capability set consumed by the controller: `create`, `update-labels`,
/// `list(filter)`, `delete(id)`, `latest-seq()`.
#[async_trait]
pub trait BeadStore: Send + Sync {
    /// Ensure the backing service is up and ready to serve. Idempotent;
    /// called once at startup and safe to call repeatedly.
    async fn ensure_ready(&self) -> Result<(), BeadStoreError>;

    async fn create(
        &self,
        bead_type: &str,
        formula: &str,
        labels: BTreeMap<String, String>,
    ) -> Result<BeadItem, BeadStoreError>;

    async fn update_labels(
        &self,
        id: &str,
        labels: BTreeMap<String, String>,
    ) -> Result<(), BeadStoreError>;

    async fn list(&self, filter: BeadFilter) -> Result<Vec<BeadItem>, BeadStoreError>;

    async fn delete(&self, id: &str) -> Result<(), BeadStoreError>;

    /// Monotone sequence number of the most recently observed bead mutation,
    /// used by event-gated automations as a cursor.
    async fn latest_seq(&self) -> Result<u64, BeadStoreError>;
}
