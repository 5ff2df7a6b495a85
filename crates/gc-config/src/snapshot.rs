// SPDX-License-Identifier: MIT

//! Concurrency-safe publication of the current config snapshot.
//!
//! The config watcher publishes; everything else (the desired-state builder,
//! at the start of each tick) reads. A tick must see either the entirely-old
//! or entirely-new snapshot, never a mix — a single
//! `parking_lot::RwLock<Arc<Config>>` swap gives us that for free, since
//! readers clone the `Arc` under the lock and then drop the lock
//! immediately.

use crate::model::Config;
use parking_lot::RwLock;
use std::sync::Arc;

/// A monotonically increasing version paired with the config it describes.
#[derive(Clone)]
pub struct ConfigSnapshot {
    pub version: u64,
    pub config: Arc<Config>,
}

/// Shared, swappable handle to the live config snapshot.
pub struct ConfigHandle {
    inner: RwLock<ConfigSnapshot>,
}

impl ConfigHandle {
    pub fn new(config: Config) -> Self {
        Self {
            inner: RwLock::new(ConfigSnapshot {
                version: 1,
                config: Arc::new(config),
            }),
        }
    }

    /// Read the current snapshot. Cheap: an `Arc` clone under a read lock.
    pub fn current(&self) -> ConfigSnapshot {
        self.inner.read().clone()
    }

    /// Publish a new config, bumping the version.
    pub fn publish(&self, config: Config) -> u64 {
        let mut guard = self.inner.write();
        let version = guard.version + 1;
        *guard = ConfigSnapshot {
            version,
            config: Arc::new(config),
        };
        version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DaemonSection, WorkspaceSection};

    fn config(name: &str) -> Config {
        Config {
            workspace: WorkspaceSection {
                name: name.into(),
                suspended: false,
            },
            rigs: vec![],
            agents: vec![],
            automations: vec![],
            daemon: DaemonSection::default(),
            beads_provider: "file".into(),
        }
    }

    #[test]
    fn initial_snapshot_has_version_one() {
        let handle = ConfigHandle::new(config("test"));
        assert_eq!(handle.current().version, 1);
    }

    #[test]
    fn publish_bumps_version_and_swaps_atomically() {
        let handle = ConfigHandle::new(config("test"));
        let new_version = handle.publish(config("test"));
        assert_eq!(new_version, 2);
        let snapshot = handle.current();
        assert_eq!(snapshot.version, 2);
        assert_eq!(snapshot.config.workspace.name, "test");
    }

    #[test]
    fn readers_never_see_a_half_applied_publish() {
        let handle = ConfigHandle::new(config("test"));
        let before = handle.current();
        handle.publish(config("test"));
        let after = handle.current();
        // `before` still points at the old Arc's contents, untouched.
        assert_eq!(before.version, 1);
        assert_eq!(after.version, 2);
    }
}
