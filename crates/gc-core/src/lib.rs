// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gc-core: shared data model for the gastropod-city reconciling controller.
//!
//! Defines the city/rig/agent/pool/automation data model, session identity
//! derivation, content fingerprinting, and the append-only event record type.
//! Contains no I/O — every type here is pure data plus pure functions over it.

pub mod automation;
pub mod clock;
pub mod event;
pub mod fingerprint;
pub mod id;
pub mod pool;
pub mod rig;
pub mod session_identity;
pub mod spec;

pub use automation::{Automation, AutomationGate, AutomationScope};
pub use clock::{Clock, FakeClock, SystemClock};
pub use event::{EventKind, EventRecord};
pub use fingerprint::Fingerprint;
pub use id::ShortId;
pub use pool::PoolDescriptor;
pub use rig::Rig;
pub use session_identity::{city_prefix, derive_session_identity, sanitize_qualified_name};
pub use spec::{AgentSpec, StartupHints};
