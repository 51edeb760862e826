//! # Drone Safety Monitor Library
//!
//! Runtime safety supervision for remotely piloted aircraft.
//!
//! This library continuously evaluates a fixed set of safety invariants
//! (altitude ceiling, battery floor, tilt limit, geofence radius) against
//! live vehicle telemetry and autonomously issues corrective flight-mode
//! commands when one is violated.

pub mod config;
pub mod error;
pub mod geofence;
pub mod safety;
pub mod vehicle;
