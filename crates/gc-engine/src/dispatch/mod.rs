// SPDX-License-Identifier: MIT

//! Scheduled dispatchers: subsystems that run once per reconcile tick,
//! after the per-agent/orphan reconcile pass. Each follows the nil-guard
//! tracker pattern: the constructor returns `None` when the subsystem has
//! nothing to do, so callers gate the whole subsystem behind one
//! `if let Some(tracker) = ...`.

pub mod automation;
pub mod crash;
pub mod idle;
pub mod wisp_gc;

pub use automation::{AutomationDispatcher, EventCursor};
pub use crash::CrashTracker;
pub use idle::IdleTracker;
pub use wisp_gc::WispGc;
