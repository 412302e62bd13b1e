//! Alert decision core
//!
//! This module provides:
//! - Quiet-hours window evaluation
//! - The rate/cooldown gate
//! - The decision engine that dispatches and commits alerts

mod engine;
mod gate;
mod quiet_hours;

pub use engine::{AlertEngine, CycleStats, DEFAULT_NOTIFY_TIMEOUT};
pub use gate::{AlertPolicy, GateDecision};
pub use quiet_hours::{is_quiet, QuietHours, QuietHoursError};
