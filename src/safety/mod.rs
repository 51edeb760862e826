//! # Safety Module
//!
//! Evaluates safety invariants against live telemetry and coordinates the
//! emergency response when one is violated.
//!
//! This module handles:
//! - Altitude, battery, tilt and geofence checks
//! - Priority-ordered corrective action dispatch (single flight)
//! - The shared, timestamped safety log
//! - Background monitoring and operator status reports

pub mod dispatcher;
pub mod invariants;
pub mod log;
pub mod monitor;
pub mod status;

pub use dispatcher::{CorrectiveAction, EmergencyDispatcher};
pub use invariants::{CheckResult, Invariant};
pub use log::{SafetyLog, SafetyLogEntry};
pub use monitor::{MonitorState, SafetyMonitor};
pub use status::StatusReport;
