//! # Vehicle Module
//!
//! The narrow interface between the safety core and the flight controller.
//!
//! This module handles:
//! - Telemetry snapshots pulled once per tick
//! - Flight-mode commands issued by the emergency dispatcher
//! - An in-process simulated vehicle for demos and tests

pub mod link;
pub mod sim;

pub use link::VehicleLink;
pub use sim::SimulatedVehicle;

use serde::Serialize;
use std::fmt;

use crate::geofence::GeoPoint;

/// Flight modes the safety core may command (ArduPilot Copter labels)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FlightMode {
    Guided,
    /// Return to launch
    Rtl,
    /// Land in place
    Land,
}

impl FlightMode {
    /// Label used on the wire and in telemetry
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            FlightMode::Guided => "GUIDED",
            FlightMode::Rtl => "RTL",
            FlightMode::Land => "LAND",
        }
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One immutable copy of vehicle state
///
/// Attitude is kept in radians exactly as the flight controller reports it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    /// Altitude relative to home (m)
    pub altitude_m: f64,
    /// Remaining battery (%)
    pub battery_pct: f64,
    /// Pitch (rad)
    pub pitch_rad: f64,
    /// Roll (rad)
    pub roll_rad: f64,
    pub lat: f64,
    pub lon: f64,
    /// Current flight mode label, e.g. "GUIDED"
    pub mode: String,
}

impl TelemetrySnapshot {
    #[must_use]
    pub fn pitch_deg(&self) -> f64 {
        self.pitch_rad.to_degrees()
    }

    #[must_use]
    pub fn roll_deg(&self) -> f64 {
        self.roll_rad.to_degrees()
    }

    #[must_use]
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

impl Default for TelemetrySnapshot {
    /// Level, on the ground, full battery, at the origin
    fn default() -> Self {
        Self {
            altitude_m: 0.0,
            battery_pct: 100.0,
            pitch_rad: 0.0,
            roll_rad: 0.0,
            lat: 0.0,
            lon: 0.0,
            mode: FlightMode::Guided.label().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_labels() {
        assert_eq!(FlightMode::Rtl.label(), "RTL");
        assert_eq!(FlightMode::Land.label(), "LAND");
        assert_eq!(FlightMode::Guided.to_string(), "GUIDED");
    }

    #[test]
    fn test_attitude_conversion() {
        let snapshot = TelemetrySnapshot {
            pitch_rad: std::f64::consts::FRAC_PI_4,
            roll_rad: -std::f64::consts::FRAC_PI_6,
            ..Default::default()
        };
        assert!((snapshot.pitch_deg() - 45.0).abs() < 1e-9);
        assert!((snapshot.roll_deg() + 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_position() {
        let snapshot = TelemetrySnapshot {
            lat: 13.7563,
            lon: 100.5018,
            ..Default::default()
        };
        assert_eq!(snapshot.position(), GeoPoint::new(13.7563, 100.5018));
    }
}
