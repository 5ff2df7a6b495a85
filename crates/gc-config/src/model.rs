// SPDX-License-Identifier: MIT

//! On-disk configuration shape, parsed from TOML.
//!
//! This is the declarative input to the desired-state builder. Parsing
//! itself is deliberately thin — composition/layering across multiple
//! files is an explicit non-goal; this crate loads one primary file plus
//! overlay files and merges them with the simplest rule that satisfies the
//! data model: overlays are applied in order, each overlay's tables
//! override same-keyed entries from earlier
//! documents.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub workspace: WorkspaceSection,
    #[serde(default)]
    pub rigs: Vec<RigEntry>,
    #[serde(default)]
    pub agents: Vec<AgentEntry>,
    #[serde(default)]
    pub automations: Vec<AutomationEntry>,
    #[serde(default)]
    pub daemon: DaemonSection,
    #[serde(default = "default_beads_provider")]
    pub beads_provider: String,
}

fn default_beads_provider() -> String {
    "file".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSection {
    pub name: String,
    #[serde(default)]
    pub suspended: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigEntry {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suspended: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEntry {
    pub name: String,
    #[serde(default)]
    pub rig: Option<String>,
    pub command: String,
    #[serde(default)]
    pub env: IndexMap<String, String>,
    /// Working directory template; defaults to `{{.CityRoot}}/{{.Agent}}`
    /// (or `{{.CityRoot}}/{{.Rig}}/{{.Agent}}` when rig-scoped) if absent.
    #[serde(default)]
    pub work_dir: Option<String>,
    #[serde(default)]
    pub session_identity: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub hints: AgentHints,
    #[serde(default)]
    pub pool: Option<PoolEntry>,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub fingerprint_extra: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentHints {
    #[serde(default)]
    pub ready_prompt_prefix: Option<String>,
    #[serde(default)]
    pub ready_delay_ms: Option<u64>,
    #[serde(default)]
    pub process_name_witnesses: Vec<String>,
    #[serde(default)]
    pub pre_start_commands: Vec<String>,
    #[serde(default)]
    pub session_setup_commands: Vec<String>,
    #[serde(default)]
    pub session_setup_script: Option<String>,
    #[serde(default)]
    pub overlay_dir: Option<PathBuf>,
    #[serde(default)]
    pub copy_files: Vec<PathBuf>,
    /// Container image reference for session providers backed by container
    /// pods; ignored by providers that don't back onto images.
    #[serde(default)]
    pub container_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolEntry {
    #[serde(default = "default_pool_min")]
    pub min: u32,
    pub max: u32,
    pub check_command: String,
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

fn default_pool_min() -> u32 {
    0
}

fn default_drain_timeout_secs() -> u64 {
    30
}

impl PoolEntry {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationEntry {
    pub name: String,
    #[serde(default)]
    pub rig: Option<String>,
    pub gate: GateEntry,
    pub formula: String,
    #[serde(default)]
    pub target_pool: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateEntry {
    Cron { schedule: String },
    Cooldown { interval_secs: u64 },
    Event { subscription: String },
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonSection {
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    #[serde(default = "default_shutdown_deadline_secs")]
    pub shutdown_deadline_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_crash_threshold")]
    pub crash_threshold: u32,
    #[serde(default = "default_crash_window_secs")]
    pub crash_window_secs: u64,
    #[serde(default = "default_wisp_gc_interval_secs")]
    pub wisp_gc_interval_secs: u64,
    #[serde(default = "default_wisp_ttl_secs")]
    pub wisp_ttl_secs: u64,
    #[serde(default = "default_debounce_ms")]
    pub config_debounce_ms: u64,
}

fn default_reconcile_interval_secs() -> u64 {
    5
}
fn default_shutdown_deadline_secs() -> u64 {
    5
}
fn default_idle_timeout_secs() -> u64 {
    30 * 60
}
fn default_crash_threshold() -> u32 {
    3
}
fn default_crash_window_secs() -> u64 {
    60
}
fn default_wisp_gc_interval_secs() -> u64 {
    3600
}
fn default_wisp_ttl_secs() -> u64 {
    7 * 24 * 3600
}
fn default_debounce_ms() -> u64 {
    100
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval_secs(),
            shutdown_deadline_secs: default_shutdown_deadline_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            crash_threshold: default_crash_threshold(),
            crash_window_secs: default_crash_window_secs(),
            wisp_gc_interval_secs: default_wisp_gc_interval_secs(),
            wisp_ttl_secs: default_wisp_ttl_secs(),
            config_debounce_ms: default_debounce_ms(),
        }
    }
}

impl DaemonSection {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_secs(self.shutdown_deadline_secs)
    }

    pub fn config_debounce(&self) -> Duration {
        Duration::from_millis(self.config_debounce_ms.max(5))
    }
}
