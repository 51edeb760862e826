//! Operator-facing status report

use serde::Serialize;

use super::invariants::CheckResult;
use crate::error::Result;

/// Mode label reported when no vehicle link is attached
pub const SIMULATION_MODE: &str = "SIMULATION";

/// Mode label reported when the vehicle link exists but no telemetry has been read
pub const NO_TELEMETRY_MODE: &str = "NO TELEMETRY";

/// Composite monitor status consumed by dashboards
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub safe: bool,
    pub mode: String,
    /// Altitude (m)
    pub altitude: f64,
    /// Battery (%)
    pub battery: f64,
    /// Pitch (deg)
    pub tilt_pitch: f64,
    /// Roll (deg)
    pub tilt_roll: f64,
    /// Meters from home, `0.0` while home is unset
    pub distance_from_home: f64,
    /// Safety log entries recorded so far
    pub warnings: usize,
    /// Per-invariant results behind `safe`, in evaluation order
    pub checks: Vec<CheckResult>,
    pub monitoring: bool,
    pub emergency_in_progress: bool,
}

impl StatusReport {
    /// Report used when there is no telemetry to evaluate
    pub(crate) fn degraded(mode: &str, warnings: usize) -> Self {
        Self {
            safe: true,
            mode: mode.to_string(),
            altitude: 0.0,
            battery: 100.0,
            tilt_pitch: 0.0,
            tilt_roll: 0.0,
            distance_from_home: 0.0,
            warnings,
            checks: Vec::new(),
            monitoring: false,
            emergency_in_progress: false,
        }
    }

    /// Serialize as a single JSON object
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_report_is_safe() {
        let report = StatusReport::degraded(SIMULATION_MODE, 3);
        assert!(report.safe);
        assert_eq!(report.mode, "SIMULATION");
        assert_eq!(report.battery, 100.0);
        assert_eq!(report.warnings, 3);
        assert!(report.checks.is_empty());
    }

    #[test]
    fn test_json_field_names() {
        let report = StatusReport::degraded(SIMULATION_MODE, 0);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        for key in [
            "safe",
            "mode",
            "altitude",
            "battery",
            "tilt_pitch",
            "tilt_roll",
            "distance_from_home",
            "warnings",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["mode"], "SIMULATION");
        assert_eq!(json["safe"], true);
    }
}
