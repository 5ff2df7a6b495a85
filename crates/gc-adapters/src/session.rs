// SPDX-License-Identifier: MIT

//! The session provider capability set: the minimum the controller consumes
//! from an abstract supervisor of detached, nameable interactive processes
//! — a terminal multiplexer, container pods, ssh workers, or a test fake.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("start failed for {name}: {reason}")]
    StartFailed { name: String, reason: String },
    #[error("stop failed for {name}: {reason}")]
    StopFailed { name: String, reason: String },
    #[error("list-running failed: {0}")]
    ListFailed(String),
    #[error("image check failed for {reference}: {reason}")]
    ImageMissing { reference: String, reason: String },
}

/// Parameters the provider needs to start a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartParams {
    pub command: String,
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
    pub startup_hints: gc_core::spec::StartupHints,
    pub copy_files: Vec<PathBuf>,
}

/// Capability set consumed by the controller.
///
/// `get_environment`/`set_environment` and `check_image` are optional
/// capabilities, modeled here as default methods returning "not supported"
/// sentinels so a minimal provider doesn't have to implement them, while the
/// reconciler's drift-detection and the builder's image pre-check can still
/// call them uniformly.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn is_running(&self, name: &str) -> Result<bool, SessionError>;

    async fn start(&self, name: &str, params: StartParams) -> Result<(), SessionError>;

    async fn stop(&self, name: &str) -> Result<(), SessionError>;

    async fn list_running(&self, prefix: &str) -> Result<Vec<String>, SessionError>;

    /// Read a key from the session's environment. Returns `Ok(None)` both
    /// when the key is absent and when the provider doesn't support reading
    /// environment at all — callers (drift detection) treat both the same
    /// way, so an older session without the key never looks "drifted".
    async fn get_environment(
        &self,
        _name: &str,
        _key: &str,
    ) -> Result<Option<String>, SessionError> {
        Ok(None)
    }

    async fn set_environment(
        &self,
        _name: &str,
        _key: &str,
        _value: &str,
    ) -> Result<(), SessionError> {
        Ok(())
    }

    /// Verify a container image reference is available. Providers that
    /// don't back onto images (a terminal multiplexer) accept every
    /// reference.
    async fn check_image(&self, _reference: &str) -> Result<(), SessionError> {
        Ok(())
    }
}
