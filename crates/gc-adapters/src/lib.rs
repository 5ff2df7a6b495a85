// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gc-adapters: capability traits the reconciling controller depends on
//! (session provider, bead store) plus subprocess execution helpers, and
//! in-memory fakes of both capabilities for tests.

pub mod beads;
pub mod exec;
pub mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod fake_beads;
#[cfg(any(test, feature = "test-support"))]
pub mod fake_session;

pub use beads::{BeadFilter, BeadItem, BeadStore, BeadStoreError};
pub use exec::{run_scale_check, run_with_timeout, ScaleCheckError, ScaleCheckOutcome};
pub use session::{SessionError, SessionProvider, StartParams};

#[cfg(any(test, feature = "test-support"))]
pub use fake_beads::FakeBeadStore;
#[cfg(any(test, feature = "test-support"))]
pub use fake_session::{FakeSessionProvider, SessionCall};
