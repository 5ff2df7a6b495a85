// SPDX-License-Identifier: MIT

//! Deterministic content hash over a session's observable configuration,
//! used for drift detection: the reconciler compares a freshly computed
//! fingerprint against the one stored in a session's environment at start.

use crate::spec::AgentSpec;
use sha2::{Digest, Sha256};
use std::fmt;

/// A hex-encoded SHA-256 digest of an `AgentSpec`'s observable fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a fingerprint read back from a session's environment. Any
    /// non-empty string is accepted — the stored value is opaque to callers,
    /// only equality against a freshly computed fingerprint matters.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Compute the fingerprint of an `AgentSpec`.
    ///
    /// Hashes a canonical JSON encoding of the fields that define the
    /// session's observable configuration: command, env (sorted by key via
    /// `BTreeMap`), hints, work dir, prompt, fingerprint-extra (also sorted).
    /// Session identity, suspended flag, and pool descriptor are NOT part of
    /// the fingerprint: changing a pool's scale bounds or suspending an agent
    /// doesn't mean the running process's observable config changed.
    pub fn compute(spec: &AgentSpec) -> Self {
        #[derive(serde::Serialize)]
        struct Fingerprinted<'a> {
            command: &'a str,
            env: &'a std::collections::BTreeMap<String, String>,
            hints: &'a crate::spec::StartupHints,
            work_dir: &'a std::path::Path,
            prompt: &'a Option<String>,
            fingerprint_extra: &'a std::collections::BTreeMap<String, String>,
        }

        let payload = Fingerprinted {
            command: &spec.command,
            env: &spec.env,
            hints: &spec.hints,
            work_dir: &spec.work_dir,
            prompt: &spec.prompt,
            fingerprint_extra: &spec.fingerprint_extra,
        };

        // BTreeMap + serde_json's default map ordering already guarantee
        // deterministic key order; to_vec never fails for this payload shape.
        let canonical = serde_json::to_vec(&payload).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        Self(hex_encode(&digest))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::StartupHints;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn base_spec() -> AgentSpec {
        AgentSpec {
            qualified_name: "mayor".into(),
            session_identity: "gc-test-mayor".into(),
            work_dir: PathBuf::from("/tmp/city/mayor"),
            command: "claude".into(),
            env: BTreeMap::new(),
            hints: StartupHints::default(),
            prompt: Some("hello".into()),
            pool: None,
            suspended: false,
            fingerprint_extra: BTreeMap::new(),
        }
    }

    #[test]
    fn identical_specs_hash_identically() {
        let a = Fingerprint::compute(&base_spec());
        let b = Fingerprint::compute(&base_spec());
        assert_eq!(a, b);
    }

    #[test]
    fn changing_command_changes_fingerprint() {
        let mut other = base_spec();
        other.command = "claude --resume".into();
        assert_ne!(Fingerprint::compute(&base_spec()), Fingerprint::compute(&other));
    }

    #[test]
    fn changing_env_order_does_not_change_fingerprint() {
        let mut a = base_spec();
        a.env.insert("A".into(), "1".into());
        a.env.insert("B".into(), "2".into());

        let mut b = base_spec();
        b.env.insert("B".into(), "2".into());
        b.env.insert("A".into(), "1".into());

        assert_eq!(Fingerprint::compute(&a), Fingerprint::compute(&b));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn env_insertion_order_never_changes_the_fingerprint(
            pairs in proptest::collection::vec(("[a-zA-Z]{1,8}", "[a-zA-Z0-9]{0,8}"), 0..8)
        ) {
            let mut forward = base_spec();
            for (k, v) in &pairs {
                forward.env.insert(k.clone(), v.clone());
            }
            let mut reversed = base_spec();
            for (k, v) in pairs.iter().rev() {
                reversed.env.insert(k.clone(), v.clone());
            }
            prop_assert_eq!(Fingerprint::compute(&forward), Fingerprint::compute(&reversed));
        }

        #[test]
        fn compute_is_deterministic_for_any_command(command in "[a-zA-Z0-9 _-]{0,40}") {
            let mut spec = base_spec();
            spec.command = command;
            prop_assert_eq!(Fingerprint::compute(&spec), Fingerprint::compute(&spec));
        }
    }

    #[test]
    fn suspended_flag_does_not_affect_fingerprint() {
        let mut suspended = base_spec();
        suspended.suspended = true;
        assert_eq!(
            Fingerprint::compute(&base_spec()),
            Fingerprint::compute(&suspended)
        );
    }

    #[test]
    fn pool_descriptor_does_not_affect_fingerprint() {
        let mut pooled = base_spec();
        pooled.pool = Some(crate::pool::PoolDescriptor {
            min: 1,
            max: 3,
            check_command: "echo 1".into(),
            drain_timeout: std::time::Duration::from_secs(5),
        });
        assert_eq!(
            Fingerprint::compute(&base_spec()),
            Fingerprint::compute(&pooled)
        );
    }

    #[test]
    fn session_identity_does_not_affect_fingerprint() {
        let mut renamed = base_spec();
        renamed.session_identity = "gc-test-other".into();
        assert_eq!(
            Fingerprint::compute(&base_spec()),
            Fingerprint::compute(&renamed)
        );
    }
}
