// SPDX-License-Identifier: MIT

//! Structural validation of a parsed [`Config`].

use crate::model::Config;
use gc_core::rig::find_duplicate_prefix;
use gc_core::Rig;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("workspace.name must not be empty")]
    EmptyWorkspaceName,
    #[error("duplicate rig prefix: {0}")]
    DuplicateRigPrefix(String),
    #[error("agent '{0}' references unknown rig '{1}'")]
    UnknownRig(String, String),
    #[error("agent '{0}' pool has min ({1}) > max ({2})")]
    InvalidPoolRange(String, u32, u32),
    #[error("duplicate agent name '{0}' within the same rig scope")]
    DuplicateAgentName(String),
    #[error("duplicate automation scoped name '{0}'")]
    DuplicateAutomation(String),
    #[error("automation '{0}' references unknown rig '{1}'")]
    AutomationUnknownRig(String, String),
}

pub fn validate(config: &Config) -> Result<(), ValidationError> {
    if config.workspace.name.trim().is_empty() {
        return Err(ValidationError::EmptyWorkspaceName);
    }

    let rigs: Vec<Rig> = config
        .rigs
        .iter()
        .map(|r| Rig::new(r.name.clone(), r.path.clone(), r.prefix.clone()))
        .collect();
    if let Some(dup) = find_duplicate_prefix(&rigs) {
        return Err(ValidationError::DuplicateRigPrefix(dup));
    }

    let rig_names: HashSet<&str> = config.rigs.iter().map(|r| r.name.as_str()).collect();

    let mut seen_qualified = HashSet::new();
    for agent in &config.agents {
        if let Some(rig) = &agent.rig {
            if !rig_names.contains(rig.as_str()) {
                return Err(ValidationError::UnknownRig(agent.name.clone(), rig.clone()));
            }
        }
        if let Some(pool) = &agent.pool {
            if pool.min > pool.max {
                return Err(ValidationError::InvalidPoolRange(
                    agent.name.clone(),
                    pool.min,
                    pool.max,
                ));
            }
        }
        let qualified = gc_core::session_identity::qualified_agent_name(
            agent.rig.as_deref(),
            &agent.name,
        );
        if !seen_qualified.insert(qualified.clone()) {
            return Err(ValidationError::DuplicateAgentName(qualified));
        }
    }

    let mut seen_automations = HashSet::new();
    for automation in &config.automations {
        if let Some(rig) = &automation.rig {
            if !rig_names.contains(rig.as_str()) {
                return Err(ValidationError::AutomationUnknownRig(
                    automation.name.clone(),
                    rig.clone(),
                ));
            }
        }
        let scoped = match &automation.rig {
            Some(rig) => format!("{}:rig:{}", automation.name, rig),
            None => automation.name.clone(),
        };
        if !seen_automations.insert(scoped.clone()) {
            return Err(ValidationError::DuplicateAutomation(scoped));
        }
    }

    Ok(())
}

/// Check whether `new` may replace `old` as the live snapshot.
///
/// The only hot-reload rule imposed: the city name must not change,
/// because session identities are derived from it.
pub fn validate_reload(old: &Config, new: &Config) -> Result<(), ReloadRejected> {
    if old.workspace.name != new.workspace.name {
        return Err(ReloadRejected::NameChanged {
            old: old.workspace.name.clone(),
            new: new.workspace.name.clone(),
        });
    }
    Ok(())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReloadRejected {
    #[error("workspace.name changed from '{old}' to '{new}'; refusing reload")]
    NameChanged { old: String, new: String },
}
