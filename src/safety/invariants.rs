//! # Invariant Checks
//!
//! The four independent safety checks evaluated every tick. Each check is a
//! pure function of the telemetry snapshot, the thresholds, and the home
//! position; none of them touch shared state.
//!
//! A failing check carries a diagnostic that embeds both the threshold and
//! the measured value. The monitor logs that message verbatim.

use serde::Serialize;
use std::fmt;

use crate::config::SafetyConfig;
use crate::geofence::GeoPoint;
use crate::vehicle::TelemetrySnapshot;

/// Safety invariants in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Invariant {
    Altitude,
    Battery,
    Tilt,
    Geofence,
}

impl Invariant {
    /// Fixed per-tick evaluation order
    pub const ALL: [Invariant; 4] = [
        Invariant::Altitude,
        Invariant::Battery,
        Invariant::Tilt,
        Invariant::Geofence,
    ];
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Invariant::Altitude => "Altitude",
            Invariant::Battery => "Battery",
            Invariant::Tilt => "Tilt",
            Invariant::Geofence => "Geofence",
        };
        f.write_str(name)
    }
}

/// Outcome of one invariant check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub invariant: Invariant,
    pub passed: bool,
    pub message: String,
    /// Altitude (m), battery (%), worst tilt axis (deg) or distance from home (m)
    pub measured_value: f64,
}

impl CheckResult {
    fn pass(invariant: Invariant, measured_value: f64, message: String) -> Self {
        Self { invariant, passed: true, message, measured_value }
    }

    fn fail(invariant: Invariant, measured_value: f64, message: String) -> Self {
        Self { invariant, passed: false, message, measured_value }
    }

    /// A non-finite reading never passes a comparison, so it fails outright
    fn unreadable(invariant: Invariant, measured_value: f64, detail: String) -> Self {
        Self::fail(invariant, measured_value, format!("{} unreadable: {}", invariant, detail))
    }
}

/// Altitude ceiling: fails when `altitude > max_altitude` or the reading is not finite
pub fn check_altitude(snapshot: &TelemetrySnapshot, config: &SafetyConfig) -> CheckResult {
    let altitude = snapshot.altitude_m;
    if !altitude.is_finite() {
        return CheckResult::unreadable(Invariant::Altitude, altitude, altitude.to_string());
    }
    if altitude > config.max_altitude_m {
        CheckResult::fail(
            Invariant::Altitude,
            altitude,
            format!("Altitude exceeded: {:.1}m > {}m", altitude, config.max_altitude_m),
        )
    } else {
        CheckResult::pass(
            Invariant::Altitude,
            altitude,
            format!("Altitude OK: {:.1}m <= {}m", altitude, config.max_altitude_m),
        )
    }
}

/// Battery floor: fails when `battery < min_battery` or the reading is not finite
pub fn check_battery(snapshot: &TelemetrySnapshot, config: &SafetyConfig) -> CheckResult {
    let battery = snapshot.battery_pct;
    if !battery.is_finite() {
        return CheckResult::unreadable(Invariant::Battery, battery, battery.to_string());
    }
    if battery < config.min_battery_pct {
        CheckResult::fail(
            Invariant::Battery,
            battery,
            format!("Low battery: {}% < {}%", battery, config.min_battery_pct),
        )
    } else {
        CheckResult::pass(
            Invariant::Battery,
            battery,
            format!("Battery OK: {}% >= {}%", battery, config.min_battery_pct),
        )
    }
}

/// Attitude limit: fails when either pitch or roll exceeds `max_tilt` in magnitude
/// or is not finite
pub fn check_tilt(snapshot: &TelemetrySnapshot, config: &SafetyConfig) -> CheckResult {
    let pitch = snapshot.pitch_deg();
    let roll = snapshot.roll_deg();
    if !pitch.is_finite() || !roll.is_finite() {
        return CheckResult::unreadable(
            Invariant::Tilt,
            f64::NAN,
            format!("Pitch: {}, Roll: {}", pitch, roll),
        );
    }
    let worst = pitch.abs().max(roll.abs());

    if pitch.abs() > config.max_tilt_deg || roll.abs() > config.max_tilt_deg {
        CheckResult::fail(
            Invariant::Tilt,
            worst,
            format!(
                "Excessive tilt detected! Pitch: {:.1}°, Roll: {:.1}° (limit {}°)",
                pitch, roll, config.max_tilt_deg
            ),
        )
    } else {
        CheckResult::pass(
            Invariant::Tilt,
            worst,
            format!("Tilt OK: {:.1}° <= {}°", worst, config.max_tilt_deg),
        )
    }
}

/// Geofence: fails when the vehicle is farther than `geofence_radius` from home
///
/// Passes without measuring while the geofence is disabled or home is unset.
pub fn check_geofence(
    snapshot: &TelemetrySnapshot,
    config: &SafetyConfig,
    home: Option<GeoPoint>,
) -> CheckResult {
    if !config.geofence_enabled {
        return CheckResult::pass(Invariant::Geofence, 0.0, "Geofence disabled".to_string());
    }

    let Some(home) = home else {
        return CheckResult::pass(Invariant::Geofence, 0.0, "Home not set".to_string());
    };

    let distance = home.distance_to(&snapshot.position());
    if !distance.is_finite() {
        return CheckResult::unreadable(
            Invariant::Geofence,
            distance,
            format!("position {}, {}", snapshot.lat, snapshot.lon),
        );
    }
    if distance > config.geofence_radius_m {
        CheckResult::fail(
            Invariant::Geofence,
            distance,
            format!("Geofence breach: {:.1}m > {}m", distance, config.geofence_radius_m),
        )
    } else {
        CheckResult::pass(
            Invariant::Geofence,
            distance,
            format!("Inside geofence: {:.1}m <= {}m", distance, config.geofence_radius_m),
        )
    }
}

/// Run all four checks in the fixed order altitude, battery, tilt, geofence
pub fn evaluate_all(
    snapshot: &TelemetrySnapshot,
    config: &SafetyConfig,
    home: Option<GeoPoint>,
) -> [CheckResult; 4] {
    [
        check_altitude(snapshot, config),
        check_battery(snapshot, config),
        check_tilt(snapshot, config),
        check_geofence(snapshot, config, home),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOME: GeoPoint = GeoPoint { lat: 13.7563, lon: 100.5018 };

    fn nominal() -> TelemetrySnapshot {
        TelemetrySnapshot {
            altitude_m: 5.0,
            battery_pct: 80.0,
            pitch_rad: 0.1,
            roll_rad: 0.05,
            lat: HOME.lat,
            lon: HOME.lon,
            mode: "GUIDED".to_string(),
        }
    }

    fn failures(results: &[CheckResult]) -> Vec<Invariant> {
        results.iter().filter(|r| !r.passed).map(|r| r.invariant).collect()
    }

    #[test]
    fn test_nominal_flight_passes_everything() {
        let config = SafetyConfig::default();
        let results = evaluate_all(&nominal(), &config, Some(HOME));
        assert!(results.iter().all(|r| r.passed));
    }

    #[test]
    fn test_evaluation_order() {
        let config = SafetyConfig::default();
        let results = evaluate_all(&nominal(), &config, Some(HOME));
        let order: Vec<Invariant> = results.iter().map(|r| r.invariant).collect();
        assert_eq!(order, Invariant::ALL.to_vec());
    }

    #[test]
    fn test_altitude_exceeded() {
        let config = SafetyConfig::default();
        let snapshot = TelemetrySnapshot { altitude_m: 12.0, ..nominal() };

        let result = check_altitude(&snapshot, &config);
        assert!(!result.passed);
        assert_eq!(result.measured_value, 12.0);
        assert!(result.message.contains("12"));
        assert!(result.message.contains("10"));
        assert_eq!(result.message, "Altitude exceeded: 12.0m > 10m");
    }

    #[test]
    fn test_altitude_at_limit_passes() {
        let config = SafetyConfig::default();
        let snapshot = TelemetrySnapshot { altitude_m: 10.0, ..nominal() };
        assert!(check_altitude(&snapshot, &config).passed);
    }

    #[test]
    fn test_low_battery() {
        let config = SafetyConfig::default();
        let snapshot = TelemetrySnapshot { battery_pct: 15.0, ..nominal() };

        let result = check_battery(&snapshot, &config);
        assert!(!result.passed);
        assert_eq!(result.message, "Low battery: 15% < 20%");
    }

    #[test]
    fn test_battery_at_floor_passes() {
        let config = SafetyConfig::default();
        let snapshot = TelemetrySnapshot { battery_pct: 20.0, ..nominal() };
        assert!(check_battery(&snapshot, &config).passed);
    }

    #[test]
    fn test_tilt_uses_degrees() {
        let config = SafetyConfig::default();

        // 0.7 rad is about 40 degrees: inside the 45 degree limit
        let snapshot = TelemetrySnapshot { pitch_rad: 0.7, ..nominal() };
        assert!(check_tilt(&snapshot, &config).passed);

        // 0.8 rad is about 45.8 degrees
        let snapshot = TelemetrySnapshot { pitch_rad: 0.8, ..nominal() };
        let result = check_tilt(&snapshot, &config);
        assert!(!result.passed);
        assert!((result.measured_value - 0.8_f64.to_degrees()).abs() < 1e-9);
        assert!(result.message.contains("45.8"));
        assert!(result.message.contains("45°"));
    }

    #[test]
    fn test_negative_roll_counts() {
        let config = SafetyConfig::default();
        let snapshot = TelemetrySnapshot { roll_rad: -1.0, ..nominal() };
        let result = check_tilt(&snapshot, &config);
        assert!(!result.passed);
        assert!(result.message.contains("-57.3"));
    }

    #[test]
    fn test_geofence_breach() {
        let config = SafetyConfig::default();
        // ~0.002 degrees north is about 222 m
        let snapshot = TelemetrySnapshot { lat: HOME.lat + 0.002, ..nominal() };

        let result = check_geofence(&snapshot, &config, Some(HOME));
        assert!(!result.passed);
        assert!(result.measured_value > 200.0);
        assert!(result.message.starts_with("Geofence breach: 222."));
        assert!(result.message.ends_with("> 100m"));
    }

    #[test]
    fn test_geofence_vacuous_without_home() {
        let config = SafetyConfig::default();
        let snapshot = TelemetrySnapshot { lat: 0.0, lon: 0.0, ..nominal() };

        let result = check_geofence(&snapshot, &config, None);
        assert!(result.passed);
        assert_eq!(result.measured_value, 0.0);
    }

    #[test]
    fn test_geofence_vacuous_when_disabled() {
        let config = SafetyConfig { geofence_enabled: false, ..Default::default() };
        let snapshot = TelemetrySnapshot { lat: 0.0, lon: 0.0, ..nominal() };
        assert!(check_geofence(&snapshot, &config, Some(HOME)).passed);
    }

    #[test]
    fn test_single_violation_fails_exactly_one_check() {
        let config = SafetyConfig::default();
        let cases = [
            (TelemetrySnapshot { altitude_m: 12.0, ..nominal() }, Invariant::Altitude),
            (TelemetrySnapshot { battery_pct: 15.0, ..nominal() }, Invariant::Battery),
            (TelemetrySnapshot { roll_rad: 1.2, ..nominal() }, Invariant::Tilt),
            (TelemetrySnapshot { lon: HOME.lon + 0.01, ..nominal() }, Invariant::Geofence),
        ];

        for (snapshot, expected) in cases {
            let results = evaluate_all(&snapshot, &config, Some(HOME));
            assert_eq!(failures(&results), vec![expected]);
        }
    }

    #[test]
    fn test_multiple_violations_keep_order() {
        let config = SafetyConfig::default();
        let snapshot = TelemetrySnapshot {
            altitude_m: 30.0,
            battery_pct: 5.0,
            pitch_rad: 1.0,
            ..nominal()
        };
        let results = evaluate_all(&snapshot, &config, Some(HOME));
        assert_eq!(
            failures(&results),
            vec![Invariant::Altitude, Invariant::Battery, Invariant::Tilt]
        );
    }

    #[test]
    fn test_non_finite_readings_fail() {
        let config = SafetyConfig::default();
        let snapshot = TelemetrySnapshot {
            altitude_m: f64::NAN,
            battery_pct: f64::NAN,
            pitch_rad: f64::NAN,
            lat: f64::NAN,
            ..nominal()
        };

        let results = evaluate_all(&snapshot, &config, Some(HOME));
        assert!(results.iter().all(|r| !r.passed));
        assert_eq!(results[0].message, "Altitude unreadable: NaN");
        assert_eq!(results[1].message, "Battery unreadable: NaN");
        assert!(results[2].message.starts_with("Tilt unreadable: Pitch: NaN"));
        assert!(results[3].message.starts_with("Geofence unreadable"));
    }

    #[test]
    fn test_infinite_altitude_fails() {
        let snapshot = TelemetrySnapshot { altitude_m: f64::INFINITY, ..nominal() };
        let result = check_altitude(&snapshot, &SafetyConfig::default());
        assert!(!result.passed);
        assert_eq!(result.message, "Altitude unreadable: inf");
    }

    #[test]
    fn test_nan_roll_alone_fails_tilt() {
        let snapshot = TelemetrySnapshot { roll_rad: f64::NAN, ..nominal() };
        assert!(!check_tilt(&snapshot, &SafetyConfig::default()).passed);
    }
}
