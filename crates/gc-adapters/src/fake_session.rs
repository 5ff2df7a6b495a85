// SPDX-License-Identifier: MIT

//! In-memory [`SessionProvider`] for tests: records every call and lets
//! tests inject start/stop failures and pre-existing "already running"
//! sessions without a real terminal multiplexer.

use crate::session::{SessionError, SessionProvider, StartParams};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum SessionCall {
    Start { name: String, params: StartParams },
    Stop { name: String },
    IsRunning { name: String },
    ListRunning { prefix: String },
}

#[derive(Debug, Clone)]
struct FakeSession {
    params: StartParams,
    env: HashMap<String, String>,
}

#[derive(Default)]
struct FakeState {
    running: HashMap<String, FakeSession>,
    calls: Vec<SessionCall>,
    fail_start: HashMap<String, String>,
    fail_stop: HashMap<String, String>,
}

/// In-memory session provider. Clone shares the same underlying state.
#[derive(Clone, Default)]
pub struct FakeSessionProvider {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.inner.lock().calls.clone()
    }

    /// Pretend a session with `name` is already running, as if started
    /// outside this provider's knowledge (used to test drift detection).
    pub fn seed_running(&self, name: &str, params: StartParams) {
        self.inner.lock().running.insert(
            name.to_string(),
            FakeSession {
                env: params.env.clone(),
                params,
            },
        );
    }

    pub fn fail_start(&self, name: &str, reason: &str) {
        self.inner
            .lock()
            .fail_start
            .insert(name.to_string(), reason.to_string());
    }

    pub fn fail_stop(&self, name: &str, reason: &str) {
        self.inner
            .lock()
            .fail_stop
            .insert(name.to_string(), reason.to_string());
    }

    pub fn is_running_sync(&self, name: &str) -> bool {
        self.inner.lock().running.contains_key(name)
    }
}

#[async_trait]
impl SessionProvider for FakeSessionProvider {
    async fn is_running(&self, name: &str) -> Result<bool, SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::IsRunning {
            name: name.to_string(),
        });
        Ok(inner.running.contains_key(name))
    }

    async fn start(&self, name: &str, params: StartParams) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::Start {
            name: name.to_string(),
            params: params.clone(),
        });
        if let Some(reason) = inner.fail_start.get(name).cloned() {
            return Err(SessionError::StartFailed {
                name: name.to_string(),
                reason,
            });
        }
        inner.running.insert(
            name.to_string(),
            FakeSession {
                env: params.env.clone(),
                params,
            },
        );
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::Stop {
            name: name.to_string(),
        });
        if let Some(reason) = inner.fail_stop.get(name).cloned() {
            return Err(SessionError::StopFailed {
                name: name.to_string(),
                reason,
            });
        }
        inner.running.remove(name);
        Ok(())
    }

    async fn list_running(&self, prefix: &str) -> Result<Vec<String>, SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::ListRunning {
            prefix: prefix.to_string(),
        });
        let mut names: Vec<String> = inner
            .running
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    async fn get_environment(
        &self,
        name: &str,
        key: &str,
    ) -> Result<Option<String>, SessionError> {
        let inner = self.inner.lock();
        Ok(inner
            .running
            .get(name)
            .and_then(|session| session.env.get(key).cloned()))
    }

    async fn set_environment(
        &self,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        match inner.running.get_mut(name) {
            Some(session) => {
                session.env.insert(key.to_string(), value.to_string());
                Ok(())
            }
            None => Err(SessionError::NotFound(name.to_string())),
        }
    }
}
