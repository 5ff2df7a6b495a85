// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gc-config: declarative city configuration — parsing, validation, and
//! concurrency-safe publication of the live snapshot.
//!
//! Composition/layering across many config sources is an explicit
//! non-goal; this crate implements the minimal merge rule needed to
//! support one primary file plus overlays, as ambient plumbing for the
//! desired-state builder.

pub mod model;
pub mod parse;
pub mod snapshot;
pub mod validate;

pub use model::{
    AgentEntry, AgentHints, AutomationEntry, Config, DaemonSection, GateEntry, PoolEntry,
    RigEntry, WorkspaceSection,
};
pub use parse::{load, ConfigError};
pub use snapshot::{ConfigHandle, ConfigSnapshot};
pub use validate::{validate, validate_reload, ReloadRejected, ValidationError};
