// SPDX-License-Identifier: MIT

//! The desired-state output: one `AgentSpec` per session that should exist
//! right now.

use crate::pool::PoolDescriptor;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Startup hints: everything the session provider needs beyond the bare
/// command to decide when a session has finished booting and how to prepare
/// it before the agent's own command runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StartupHints {
    pub ready_prompt_prefix: Option<String>,
    pub ready_delay_ms: Option<u64>,
    pub process_name_witnesses: Vec<String>,
    pub pre_start_commands: Vec<String>,
    pub session_setup_commands: Vec<String>,
    pub session_setup_script: Option<String>,
    pub overlay_dir: Option<PathBuf>,
    pub copy_files: Vec<PathBuf>,
    pub container_image: Option<String>,
}

/// The declarative description of one agent session the controller wants to
/// exist. Produced by the desired-state builder; consumed by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AgentSpec {
    /// `<rig>/<local>` when rig-scoped, else `<local>`.
    pub qualified_name: String,
    /// `gc-<city>-<sanitized-qualified-name>`, or a templated override.
    pub session_identity: String,
    pub work_dir: PathBuf,
    pub command: String,
    pub env: BTreeMap<String, String>,
    pub hints: StartupHints,
    pub prompt: Option<String>,
    pub pool: Option<PoolDescriptor>,
    pub suspended: bool,
    pub fingerprint_extra: BTreeMap<String, String>,
}

impl AgentSpec {
    /// Reserved env key holding this `AgentSpec`'s content fingerprint once
    /// the session has been started (set by the reconciler, not the builder).
    pub const FINGERPRINT_ENV_KEY: &'static str = "GC_FINGERPRINT";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> AgentSpec {
        AgentSpec {
            qualified_name: "mayor".into(),
            session_identity: "gc-test-mayor".into(),
            work_dir: PathBuf::from("/tmp/city/mayor"),
            command: "claude".into(),
            env: BTreeMap::new(),
            hints: StartupHints::default(),
            prompt: None,
            pool: None,
            suspended: false,
            fingerprint_extra: BTreeMap::new(),
        }
    }

    #[test]
    fn fingerprint_env_key_is_reserved() {
        assert_eq!(AgentSpec::FINGERPRINT_ENV_KEY, "GC_FINGERPRINT");
        assert!(!spec().env.contains_key(AgentSpec::FINGERPRINT_ENV_KEY));
    }
}
