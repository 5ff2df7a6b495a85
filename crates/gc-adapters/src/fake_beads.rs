// SPDX-License-Identifier: MIT

//! In-memory [`BeadStore`] for tests.

use crate::beads::{BeadFilter, BeadItem, BeadStore, BeadStoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
struct FakeState {
    items: Vec<BeadItem>,
    next_id: u64,
    next_seq: u64,
    ready: bool,
    fail_ensure_ready: bool,
}

#[derive(Clone)]
pub struct FakeBeadStore {
    inner: Arc<Mutex<FakeState>>,
    clock: gc_core::clock::FakeClock,
}

impl FakeBeadStore {
    pub fn new(clock: gc_core::clock::FakeClock) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState::default())),
            clock,
        }
    }

    pub fn fail_ensure_ready(&self) {
        self.inner.lock().fail_ensure_ready = true;
    }

    pub fn is_ready(&self) -> bool {
        self.inner.lock().ready
    }

    /// Directly insert a closed item with a given age, bypassing `create`,
    /// to set up wisp-garbage-collector test fixtures.
    pub fn seed_closed(&self, bead_type: &str, created_at_epoch_ms: u64) -> String {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = format!("bead-{}", inner.next_id);
        inner.items.push(BeadItem {
            id: id.clone(),
            bead_type: bead_type.to_string(),
            labels: BTreeMap::new(),
            closed: true,
            created_at_epoch_ms,
        });
        id
    }
}

#[async_trait]
impl BeadStore for FakeBeadStore {
    async fn ensure_ready(&self) -> Result<(), BeadStoreError> {
        let mut inner = self.inner.lock();
        if inner.fail_ensure_ready {
            return Err(BeadStoreError::Unavailable("fake: forced failure".into()));
        }
        inner.ready = true;
        Ok(())
    }

    async fn create(
        &self,
        bead_type: &str,
        _formula: &str,
        labels: BTreeMap<String, String>,
    ) -> Result<BeadItem, BeadStoreError> {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        inner.next_seq += 1;
        let item = BeadItem {
            id: format!("bead-{}", inner.next_id),
            bead_type: bead_type.to_string(),
            labels,
            closed: false,
            created_at_epoch_ms: self.clock.now_epoch_ms(),
        };
        inner.items.push(item.clone());
        Ok(item)
    }

    async fn update_labels(
        &self,
        id: &str,
        labels: BTreeMap<String, String>,
    ) -> Result<(), BeadStoreError> {
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        match inner.items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.labels.extend(labels);
                Ok(())
            }
            None => Err(BeadStoreError::NotFound(id.to_string())),
        }
    }

    async fn list(&self, filter: BeadFilter) -> Result<Vec<BeadItem>, BeadStoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .items
            .iter()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<(), BeadStoreError> {
        let mut inner = self.inner.lock();
        let before = inner.items.len();
        inner.items.retain(|item| item.id != id);
        if inner.items.len() == before {
            return Err(BeadStoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn latest_seq(&self) -> Result<u64, BeadStoreError> {
        Ok(self.inner.lock().next_seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gc_core::clock::{Clock, FakeClock};

    #[tokio::test]
    async fn create_then_list_round_trips() {
        let store = FakeBeadStore::new(FakeClock::new(0));
        let item = store
            .create("molecule", "formula body", BTreeMap::new())
            .await
            .unwrap();
        let listed = store.list(BeadFilter::default()).await.unwrap();
        assert_eq!(listed, vec![item]);
    }

    #[tokio::test]
    async fn update_labels_merges_into_existing() {
        let store = FakeBeadStore::new(FakeClock::new(0));
        let item = store
            .create("molecule", "formula", BTreeMap::new())
            .await
            .unwrap();
        let mut labels = BTreeMap::new();
        labels.insert("automation-run:nightly".to_string(), "1".to_string());
        store.update_labels(&item.id, labels).await.unwrap();
        let listed = store.list(BeadFilter::default()).await.unwrap();
        assert_eq!(listed[0].labels.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_item() {
        let store = FakeBeadStore::new(FakeClock::new(0));
        let item = store
            .create("molecule", "formula", BTreeMap::new())
            .await
            .unwrap();
        store.delete(&item.id).await.unwrap();
        assert!(store.list(BeadFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_unknown_id_is_not_found() {
        let store = FakeBeadStore::new(FakeClock::new(0));
        let err = store.delete("ghost").await.unwrap_err();
        assert!(matches!(err, BeadStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn latest_seq_advances_on_mutation() {
        let store = FakeBeadStore::new(FakeClock::new(0));
        assert_eq!(store.latest_seq().await.unwrap(), 0);
        store.create("wisp", "f", BTreeMap::new()).await.unwrap();
        assert_eq!(store.latest_seq().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ensure_ready_can_be_forced_to_fail() {
        let store = FakeBeadStore::new(FakeClock::new(0));
        store.fail_ensure_ready();
        assert!(store.ensure_ready().await.is_err());
        assert!(!store.is_ready());
    }

    #[tokio::test]
    async fn filter_by_type_and_closed() {
        let store = FakeBeadStore::new(FakeClock::new(0));
        store.seed_closed("molecule", 1_000);
        store.create("wisp", "f", BTreeMap::new()).await.unwrap();
        let closed_molecules = store
            .list(BeadFilter {
                bead_type: Some("molecule".to_string()),
                closed: Some(true),
                label: None,
            })
            .await
            .unwrap();
        assert_eq!(closed_molecules.len(), 1);
    }
}
