// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gc-engine: the desired-state builder, the reconciler, and the scheduled
//! dispatchers (automation, wisp GC, idle tracker, crash tracker) that run
//! every tick of the city's reconcile loop.

pub mod builder;
pub mod dispatch;
pub mod draining;
pub mod reconciler;

pub use builder::{
    build_desired_state, compute_session_sets, precheck_images, BuildError, CityContext,
    SessionSets,
};
pub use dispatch::{AutomationDispatcher, CrashTracker, EventCursor, IdleTracker, WispGc};
pub use draining::DrainRegistry;
pub use reconciler::{Reconciler, ReconcilerError, TickReport};
