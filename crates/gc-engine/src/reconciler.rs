// SPDX-License-Identifier: MIT

//! The reconciler: the six-row decision table plus the Phase 2 orphan
//! cleanup pass. Touches at most one session at most once per tick;
//! failures on one session are logged and never abort the tick.

use crate::dispatch::{CrashTracker, IdleTracker};
use crate::draining::DrainRegistry;
use crate::SessionSets;
use gc_adapters::session::{SessionProvider, StartParams};
use gc_core::fingerprint::Fingerprint;
use gc_core::spec::AgentSpec;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("listing running sessions failed during orphan cleanup: {0}")]
    ListRunning(String),
}

/// What the reconciler did this tick, for stdout lifecycle announcements
/// and tests. Not exhaustive logging — only the session-touching actions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    pub restarted: Vec<String>,
    pub drain_started: Vec<String>,
    pub drain_stopped: Vec<String>,
    pub failed: Vec<String>,
    /// Sessions whose start was skipped this tick because the crash
    /// tracker quarantined them.
    pub quarantined: Vec<String>,
}

impl TickReport {
    fn touched(&self, name: &str) -> bool {
        self.started.iter().any(|n| n == name)
            || self.stopped.iter().any(|n| n == name)
            || self.restarted.iter().any(|n| n == name)
            || self.drain_started.iter().any(|n| n == name)
            || self.drain_stopped.iter().any(|n| n == name)
    }
}

pub struct Reconciler {
    session: Arc<dyn SessionProvider>,
    drains: DrainRegistry,
    crash_tracker: Option<Arc<CrashTracker>>,
    idle_tracker: Option<Arc<IdleTracker>>,
}

impl Reconciler {
    pub fn new(session: Arc<dyn SessionProvider>) -> Self {
        Self {
            session,
            drains: DrainRegistry::new(),
            crash_tracker: None,
            idle_tracker: None,
        }
    }

    pub fn with_crash_tracker(mut self, tracker: Arc<CrashTracker>) -> Self {
        self.crash_tracker = Some(tracker);
        self
    }

    pub fn with_idle_tracker(mut self, tracker: Arc<IdleTracker>) -> Self {
        self.idle_tracker = Some(tracker);
        self
    }

    pub fn drains(&self) -> &DrainRegistry {
        &self.drains
    }

    /// Run one reconcile tick. `city_prefix` bounds the orphan sweep in
    /// Phase 2 to sessions this controller owns.
    pub async fn reconcile(
        &self,
        desired: &[AgentSpec],
        sets: &SessionSets,
        city_prefix: &str,
        now_epoch_ms: u64,
    ) -> Result<TickReport, ReconcilerError> {
        let mut report = TickReport::default();

        self.reconcile_suspended(sets, &mut report).await;
        self.reconcile_desired(desired, now_epoch_ms, &mut report).await;
        self.reconcile_orphans(desired, sets, city_prefix, now_epoch_ms, &mut report)
            .await?;

        Ok(report)
    }

    /// Stop every session whose idle clock has exceeded the configured
    /// timeout. Run once per tick, after [`reconcile`]. No-op when no
    /// idle tracker is configured (nil-guard).
    pub async fn sweep_idle(&self, now_epoch_ms: u64) -> Vec<String> {
        let Some(idle_tracker) = &self.idle_tracker else {
            return Vec::new();
        };

        let mut stopped = Vec::new();
        for identity in idle_tracker.expired(now_epoch_ms) {
            match self.session.stop(&identity).await {
                Ok(()) => {
                    info!(session = %identity, "stopped idle session");
                    idle_tracker.note_touched(&identity);
                    if let Some(crash_tracker) = &self.crash_tracker {
                        crash_tracker.clear(&identity);
                    }
                    stopped.push(identity);
                }
                Err(err) => {
                    warn!(session = %identity, error = %err, "failed to stop idle session, will retry next tick");
                }
            }
        }
        stopped
    }

    /// Rows 1 and 2: sessions belonging to a suspended agent, rig, or
    /// workspace. Running -> stop; not running -> noop.
    async fn reconcile_suspended(&self, sets: &SessionSets, report: &mut TickReport) {
        for identity in &sets.suspended_identities {
            if report.touched(identity) {
                continue;
            }
            match self.session.is_running(identity).await {
                Ok(true) => match self.session.stop(identity).await {
                    Ok(()) => {
                        info!(session = %identity, "stopped suspended session");
                        report.stopped.push(identity.clone());
                    }
                    Err(err) => {
                        warn!(session = %identity, error = %err, "failed to stop suspended session");
                        report.failed.push(identity.clone());
                    }
                },
                Ok(false) => {}
                Err(err) => {
                    warn!(session = %identity, error = %err, "is-running check failed for suspended session");
                    report.failed.push(identity.clone());
                }
            }
        }
    }

    /// Rows 3 through 6: every entry in the desired set.
    async fn reconcile_desired(&self, desired: &[AgentSpec], now_epoch_ms: u64, report: &mut TickReport) {
        for spec in desired {
            let identity = &spec.session_identity;
            if report.touched(identity) {
                // Two pool instances should never collide on identity, but
                // guard the at-most-once invariant regardless.
                continue;
            }

            let is_running = match self.session.is_running(identity).await {
                Ok(running) => running,
                Err(err) => {
                    warn!(session = %identity, error = %err, "is-running check failed");
                    report.failed.push(identity.clone());
                    continue;
                }
            };

            if let Some(crash_tracker) = &self.crash_tracker {
                crash_tracker.observe(identity, is_running, now_epoch_ms);
            }

            if !is_running {
                if let Some(crash_tracker) = &self.crash_tracker {
                    if crash_tracker.should_skip_start(identity, now_epoch_ms) {
                        warn!(session = %identity, "skipping start, session is crash-looping");
                        report.quarantined.push(identity.clone());
                        continue;
                    }
                }
                let started = self.start_and_record(spec, report, false).await;
                if started {
                    if let Some(crash_tracker) = &self.crash_tracker {
                        // Started successfully: reflect the post-action
                        // state so next tick's transition check compares
                        // against reality, not this tick's pre-start read.
                        crash_tracker.observe(identity, true, now_epoch_ms);
                    }
                }
                continue;
            }

            let current_fp = Fingerprint::compute(spec);
            let stored = self
                .session
                .get_environment(identity, AgentSpec::FINGERPRINT_ENV_KEY)
                .await
                .unwrap_or(None);

            match stored {
                None => {
                    // Row 6: graceful upgrade. No stored hash means we
                    // can't tell if this session matches desired state,
                    // so treat it as a match rather than restart.
                    if let Some(idle_tracker) = &self.idle_tracker {
                        idle_tracker.note_steady(identity, now_epoch_ms);
                    }
                }
                Some(stored) if stored == current_fp.as_str() => {
                    // Row 4: no drift.
                    if let Some(idle_tracker) = &self.idle_tracker {
                        idle_tracker.note_steady(identity, now_epoch_ms);
                    }
                }
                Some(_) => {
                    // Row 5: drift detected, restart.
                    match self.session.stop(identity).await {
                        Ok(()) => {
                            let restarted = self.start_and_record(spec, report, true).await;
                            if restarted {
                                if let Some(crash_tracker) = &self.crash_tracker {
                                    crash_tracker.observe(identity, true, now_epoch_ms);
                                }
                            }
                        }
                        Err(err) => {
                            warn!(session = %identity, error = %err, "stop failed during restart, will retry next tick");
                            report.failed.push(identity.clone());
                        }
                    }
                }
            }
        }
    }

    /// Returns true if the session was started successfully.
    async fn start_and_record(&self, spec: &AgentSpec, report: &mut TickReport, is_restart: bool) -> bool {
        let identity = &spec.session_identity;
        let params = StartParams {
            command: spec.command.clone(),
            env: spec.env.clone(),
            cwd: spec.work_dir.clone(),
            startup_hints: spec.hints.clone(),
            copy_files: spec.hints.copy_files.clone(),
        };
        match self.session.start(identity, params).await {
            Ok(()) => {
                let fingerprint = Fingerprint::compute(spec);
                if let Err(err) = self
                    .session
                    .set_environment(identity, AgentSpec::FINGERPRINT_ENV_KEY, fingerprint.as_str())
                    .await
                {
                    warn!(session = %identity, error = %err, "failed to record fingerprint after start");
                }
                if let Some(idle_tracker) = &self.idle_tracker {
                    idle_tracker.note_touched(identity);
                }
                if is_restart {
                    info!(session = %identity, "restarted session (fingerprint drift)");
                    report.restarted.push(identity.clone());
                } else {
                    info!(session = %identity, "started session");
                    report.started.push(identity.clone());
                }
                true
            }
            Err(err) => {
                warn!(session = %identity, error = %err, "start failed");
                report.failed.push(identity.clone());
                false
            }
        }
    }

    /// Phase 2: anything running under our prefix that isn't desired and
    /// wasn't already handled by the suspended pass.
    async fn reconcile_orphans(
        &self,
        desired: &[AgentSpec],
        sets: &SessionSets,
        city_prefix: &str,
        now_epoch_ms: u64,
        report: &mut TickReport,
    ) -> Result<(), ReconcilerError> {
        let running = match self.session.list_running(city_prefix).await {
            Ok(names) => names,
            Err(err) => {
                warn!(error = %err, "list-running failed, skipping orphan cleanup this tick");
                return Ok(());
            }
        };

        let desired_identities: BTreeSet<&str> =
            desired.iter().map(|s| s.session_identity.as_str()).collect();

        for name in &running {
            if desired_identities.contains(name.as_str()) {
                continue;
            }
            if sets.suspended_identities.contains(name) {
                continue;
            }
            if report.touched(name) {
                continue;
            }

            if sets.pool_identities.contains(name) {
                self.drain_one(name, sets, now_epoch_ms, report).await;
            } else {
                match self.session.stop(name).await {
                    Ok(()) => {
                        info!(session = %name, "stopped orphan session");
                        if let Some(idle_tracker) = &self.idle_tracker {
                            idle_tracker.note_touched(name);
                        }
                        if let Some(crash_tracker) = &self.crash_tracker {
                            crash_tracker.clear(name);
                        }
                        report.stopped.push(name.clone());
                    }
                    Err(err) => {
                        warn!(session = %name, error = %err, "failed to stop orphan session");
                        report.failed.push(name.clone());
                    }
                }
            }
        }

        Ok(())
    }

    async fn drain_one(
        &self,
        name: &str,
        sets: &SessionSets,
        now_epoch_ms: u64,
        report: &mut TickReport,
    ) {
        if !self.drains.is_draining(name) {
            let timeout = sets
                .pool_drain_timeout
                .get(name)
                .copied()
                .unwrap_or(std::time::Duration::from_secs(30));
            self.drains.mark_draining(name, now_epoch_ms, timeout);
            info!(session = %name, "draining pool member (excess capacity)");
            report.drain_started.push(name.to_string());
            return;
        }

        if self.drains.is_overdue(name, now_epoch_ms) {
            match self.session.stop(name).await {
                Ok(()) => {
                    info!(session = %name, "drain timeout elapsed, stopped session");
                    self.drains.clear(name);
                    report.drain_stopped.push(name.to_string());
                }
                Err(err) => {
                    warn!(session = %name, error = %err, "failed to stop draining session");
                    report.failed.push(name.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CityContext;
    use gc_adapters::session::StartParams as SP;
    use gc_adapters::FakeSessionProvider;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn spec(name: &str) -> AgentSpec {
        AgentSpec {
            qualified_name: name.into(),
            session_identity: format!("gc-test-{name}"),
            work_dir: PathBuf::from("/tmp"),
            command: "claude".into(),
            env: BTreeMap::new(),
            hints: gc_core::spec::StartupHints::default(),
            prompt: None,
            pool: None,
            suspended: false,
            fingerprint_extra: BTreeMap::new(),
        }
    }

    fn ctx() -> CityContext {
        CityContext {
            city_name: "test".into(),
            city_path: PathBuf::from("/cities/test"),
            city_prefix: "gc-test-".into(),
            now_epoch_ms: 0,
        }
    }

    #[tokio::test]
    async fn row3_starts_missing_desired_session() {
        let provider = Arc::new(FakeSessionProvider::new());
        let reconciler = Reconciler::new(provider.clone());
        let desired = vec![spec("mayor")];
        let sets = SessionSets::default();
        let report = reconciler.reconcile(&desired, &sets, &ctx().city_prefix, 0).await.unwrap();
        assert_eq!(report.started, vec!["gc-test-mayor".to_string()]);
        assert!(provider.is_running_sync("gc-test-mayor"));
    }

    #[tokio::test]
    async fn row4_no_restart_when_fingerprint_matches() {
        let provider = Arc::new(FakeSessionProvider::new());
        let reconciler = Reconciler::new(provider.clone());
        let desired = vec![spec("mayor")];
        let sets = SessionSets::default();
        reconciler.reconcile(&desired, &sets, "gc-test-", 0).await.unwrap();

        let report = reconciler.reconcile(&desired, &sets, "gc-test-", 1).await.unwrap();
        assert!(report.started.is_empty());
        assert!(report.restarted.is_empty());
    }

    #[tokio::test]
    async fn row5_restarts_on_fingerprint_drift() {
        let provider = Arc::new(FakeSessionProvider::new());
        let reconciler = Reconciler::new(provider.clone());
        let first = vec![spec("mayor")];
        let sets = SessionSets::default();
        reconciler.reconcile(&first, &sets, "gc-test-", 0).await.unwrap();

        let mut changed = spec("mayor");
        changed.command = "different-command".into();
        let second = vec![changed];
        let report = reconciler.reconcile(&second, &sets, "gc-test-", 1).await.unwrap();
        assert_eq!(report.restarted, vec!["gc-test-mayor".to_string()]);
    }

    #[tokio::test]
    async fn row6_graceful_upgrade_does_not_restart_when_hash_absent() {
        let provider = Arc::new(FakeSessionProvider::new());
        let reconciler = Reconciler::new(provider.clone());
        // Seed a session that's running but has no recorded fingerprint,
        // as if started by a previous controller version.
        provider.seed_running(
            "gc-test-mayor",
            SP {
                command: "claude".into(),
                env: BTreeMap::new(),
                cwd: PathBuf::from("/tmp"),
                startup_hints: gc_core::spec::StartupHints::default(),
                copy_files: vec![],
            },
        );
        let desired = vec![spec("mayor")];
        let sets = SessionSets::default();
        let report = reconciler.reconcile(&desired, &sets, "gc-test-", 0).await.unwrap();
        assert!(report.started.is_empty());
        assert!(report.restarted.is_empty());
    }

    #[tokio::test]
    async fn row1_stops_running_suspended_session() {
        let provider = Arc::new(FakeSessionProvider::new());
        let reconciler = Reconciler::new(provider.clone());
        provider.start("gc-test-mayor", SP {
            command: "claude".into(),
            env: BTreeMap::new(),
            cwd: PathBuf::from("/tmp"),
            startup_hints: gc_core::spec::StartupHints::default(),
            copy_files: vec![],
        }).await.unwrap();

        let mut sets = SessionSets::default();
        sets.suspended_identities.insert("gc-test-mayor".to_string());

        let report = reconciler.reconcile(&[], &sets, "gc-test-", 0).await.unwrap();
        assert_eq!(report.stopped, vec!["gc-test-mayor".to_string()]);
    }

    #[tokio::test]
    async fn true_orphan_is_stopped() {
        let provider = Arc::new(FakeSessionProvider::new());
        let reconciler = Reconciler::new(provider.clone());
        provider.start("gc-test-ghost", SP {
            command: "claude".into(),
            env: BTreeMap::new(),
            cwd: PathBuf::from("/tmp"),
            startup_hints: gc_core::spec::StartupHints::default(),
            copy_files: vec![],
        }).await.unwrap();

        let sets = SessionSets::default();
        let report = reconciler.reconcile(&[], &sets, "gc-test-", 0).await.unwrap();
        assert_eq!(report.stopped, vec!["gc-test-ghost".to_string()]);
    }

    #[tokio::test]
    async fn pool_member_drains_instead_of_stopping_immediately() {
        let provider = Arc::new(FakeSessionProvider::new());
        let reconciler = Reconciler::new(provider.clone());
        provider.start("gc-test-worker-3", SP {
            command: "claude".into(),
            env: BTreeMap::new(),
            cwd: PathBuf::from("/tmp"),
            startup_hints: gc_core::spec::StartupHints::default(),
            copy_files: vec![],
        }).await.unwrap();

        let mut sets = SessionSets::default();
        sets.pool_identities.insert("gc-test-worker-3".to_string());
        sets.pool_drain_timeout.insert("gc-test-worker-3".to_string(), Duration::from_secs(30));

        let report = reconciler.reconcile(&[], &sets, "gc-test-", 0).await.unwrap();
        assert_eq!(report.drain_started, vec!["gc-test-worker-3".to_string()]);
        assert!(provider.is_running_sync("gc-test-worker-3"));
        assert!(reconciler.drains().is_draining("gc-test-worker-3"));
    }

    #[tokio::test]
    async fn draining_pool_member_is_stopped_once_timeout_elapses() {
        let provider = Arc::new(FakeSessionProvider::new());
        let reconciler = Reconciler::new(provider.clone());
        provider.start("gc-test-worker-3", SP {
            command: "claude".into(),
            env: BTreeMap::new(),
            cwd: PathBuf::from("/tmp"),
            startup_hints: gc_core::spec::StartupHints::default(),
            copy_files: vec![],
        }).await.unwrap();

        let mut sets = SessionSets::default();
        sets.pool_identities.insert("gc-test-worker-3".to_string());
        sets.pool_drain_timeout.insert("gc-test-worker-3".to_string(), Duration::from_secs(10));

        reconciler.reconcile(&[], &sets, "gc-test-", 0).await.unwrap();
        assert!(provider.is_running_sync("gc-test-worker-3"));

        let report = reconciler.reconcile(&[], &sets, "gc-test-", 11_000).await.unwrap();
        assert_eq!(report.drain_stopped, vec!["gc-test-worker-3".to_string()]);
        assert!(!provider.is_running_sync("gc-test-worker-3"));
    }

    #[tokio::test]
    async fn crash_tracker_quarantines_tight_restart_loop_for_one_tick() {
        let provider = Arc::new(FakeSessionProvider::new());
        let crash_tracker = Arc::new(CrashTracker::new(2, Duration::from_secs(60)).unwrap());
        let reconciler = Reconciler::new(provider.clone()).with_crash_tracker(crash_tracker);
        let desired = vec![spec("mayor")];
        let sets = SessionSets::default();
        let identity = "gc-test-mayor";

        let report = reconciler.reconcile(&desired, &sets, "gc-test-", 0).await.unwrap();
        assert_eq!(report.started, vec![identity.to_string()]);

        provider.stop(identity).await.unwrap();
        let report = reconciler.reconcile(&desired, &sets, "gc-test-", 1_000).await.unwrap();
        assert_eq!(report.started, vec![identity.to_string()]);
        assert!(report.quarantined.is_empty());

        provider.stop(identity).await.unwrap();
        let report = reconciler.reconcile(&desired, &sets, "gc-test-", 2_000).await.unwrap();
        assert!(report.started.is_empty());
        assert_eq!(report.quarantined, vec![identity.to_string()]);
        assert!(!provider.is_running_sync(identity));

        let report = reconciler.reconcile(&desired, &sets, "gc-test-", 3_000).await.unwrap();
        assert_eq!(report.started, vec![identity.to_string()]);
    }

    #[tokio::test]
    async fn idle_tracker_stops_session_once_steady_past_timeout() {
        let provider = Arc::new(FakeSessionProvider::new());
        let idle_tracker = Arc::new(IdleTracker::new(Duration::from_secs(60)).unwrap());
        let reconciler = Reconciler::new(provider.clone()).with_idle_tracker(idle_tracker);
        let desired = vec![spec("mayor")];
        let sets = SessionSets::default();
        let identity = "gc-test-mayor";

        reconciler.reconcile(&desired, &sets, "gc-test-", 0).await.unwrap();
        assert!(provider.is_running_sync(identity));

        // First row-4 (steady) observation starts the idle clock.
        reconciler.reconcile(&desired, &sets, "gc-test-", 1_000).await.unwrap();

        // Still under timeout from the steady observation at t=1_000.
        reconciler.reconcile(&desired, &sets, "gc-test-", 30_000).await.unwrap();
        let stopped = reconciler.sweep_idle(30_000).await;
        assert!(stopped.is_empty());
        assert!(provider.is_running_sync(identity));

        // Now past timeout (60s) measured from the first steady tick.
        reconciler.reconcile(&desired, &sets, "gc-test-", 61_000).await.unwrap();
        let stopped = reconciler.sweep_idle(61_000).await;
        assert_eq!(stopped, vec![identity.to_string()]);
        assert!(!provider.is_running_sync(identity));
    }

    #[tokio::test]
    async fn no_trackers_configured_is_a_pure_noop_sweep() {
        let provider = Arc::new(FakeSessionProvider::new());
        let reconciler = Reconciler::new(provider.clone());
        assert!(reconciler.sweep_idle(1_000_000).await.is_empty());
    }
}
