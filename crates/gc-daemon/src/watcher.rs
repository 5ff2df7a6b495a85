// SPDX-License-Identifier: MIT

//! Config watcher & reload. Watches the primary config file's directory
//! plus any overlay directories for filesystem events, debounces bursts
//! into a level-triggered dirty flag, and reloads on the next tick if
//! dirty. Built on `notify`'s recommended watcher setup; the
//! debounce-then-dirty-flag shape is deliberately simpler than a full
//! event queue.

use gc_config::{load, validate_reload, Config, ConfigError, ConfigHandle, ReloadRejected};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("setting up filesystem watcher: {0}")]
    Setup(#[from] notify::Error),
}

/// Outcome of one `reload_if_dirty` call, for stdout/event-log reporting by
/// the lifecycle coordinator.
#[derive(Debug)]
pub enum ReloadOutcome {
    NotDirty,
    Reloaded { version: u64 },
    ParseFailed(ConfigError),
    Rejected(ReloadRejected),
}

/// Watches the primary config file plus overlays for changes and republishes
/// a validated snapshot to [`ConfigHandle`] once per dirty tick.
pub struct ConfigWatcher {
    primary: PathBuf,
    overlays: Vec<PathBuf>,
    handle: Arc<ConfigHandle>,
    dirty: Arc<AtomicBool>,
    // Held only to keep the OS watch alive for the controller's lifetime.
    #[allow(dead_code)]
    watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching. `initial` is the already-loaded, already-validated
    /// config this controller booted with.
    pub fn start(
        primary: PathBuf,
        overlays: Vec<PathBuf>,
        initial: Config,
    ) -> Result<Self, WatcherError> {
        let handle = Arc::new(ConfigHandle::new(initial));
        let dirty = Arc::new(AtomicBool::new(false));

        let dirty_for_events = Arc::clone(&dirty);
        let watched_paths: Vec<PathBuf> = std::iter::once(primary.clone())
            .chain(overlays.iter().cloned())
            .collect();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if event
                        .paths
                        .iter()
                        .any(|p| watched_paths.iter().any(|w| paths_match(w, p)))
                    {
                        dirty_for_events.store(true, Ordering::SeqCst);
                    }
                }
                Err(err) => warn!(error = %err, "config watcher event error"),
            }
        })?;

        for dir in watch_dirs(&primary, &overlays) {
            watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        }

        Ok(Self {
            primary,
            overlays,
            handle,
            dirty,
            watcher,
        })
    }

    pub fn handle(&self) -> Arc<ConfigHandle> {
        Arc::clone(&self.handle)
    }

    /// Mark dirty directly, bypassing the filesystem watcher. Exposed for
    /// tests and for a future explicit "reload now" control message.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// If dirty, attempt a reload: read, parse, validate against the reload
    /// rule, and atomically swap the live snapshot. On any failure the
    /// previous snapshot is kept and the dirty flag is cleared regardless,
    /// so a config that can never parse doesn't spin every tick.
    pub fn reload_if_dirty(&self) -> ReloadOutcome {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return ReloadOutcome::NotDirty;
        }

        let new_config = match load(&self.primary, &self.overlays) {
            Ok(config) => config,
            Err(err) => return ReloadOutcome::ParseFailed(err),
        };

        let current = self.handle.current();
        if let Err(rejected) = validate_reload(&current.config, &new_config) {
            return ReloadOutcome::Rejected(rejected);
        }

        let version = self.handle.publish(new_config);
        ReloadOutcome::Reloaded { version }
    }
}

fn paths_match(watched: &Path, observed: &Path) -> bool {
    observed
        .file_name()
        .zip(watched.file_name())
        .map(|(a, b)| a == b)
        .unwrap_or(false)
        && observed
            .parent()
            .zip(watched.parent())
            .map(|(a, b)| a == b)
            .unwrap_or(true)
}

fn watch_dirs(primary: &Path, overlays: &[PathBuf]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for path in std::iter::once(primary).chain(overlays.iter().map(|p| p.as_path())) {
        if let Some(parent) = path.parent() {
            if !dirs.iter().any(|d| d == parent) {
                dirs.push(parent.to_path_buf());
            }
        }
    }
    dirs
}

/// Default debounce window guard: callers sleep this long after receiving a
/// filesystem event before checking the dirty flag, coalescing a burst of
/// events into one reload.
pub fn debounce_window(config_debounce_ms: u64) -> Duration {
    Duration::from_millis(config_debounce_ms.max(5))
}
