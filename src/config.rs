//! # Configuration Module
//!
//! Handles loading and validating monitor configuration from TOML files.
//!
//! The `[safety]` table carries the operator thresholds under the same keys
//! the ground station has always used (`max_altitude`, `min_battery`,
//! `max_tilt_angle`, `geofence_enabled`, `geofence_radius`). Every key is
//! optional and falls back to a conservative default.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SafetyError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Safety thresholds evaluated every tick
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SafetyConfig {
    #[serde(rename = "max_altitude", default = "default_max_altitude")]
    pub max_altitude_m: f64,

    #[serde(rename = "min_battery", default = "default_min_battery")]
    pub min_battery_pct: f64,

    #[serde(rename = "max_tilt_angle", default = "default_max_tilt")]
    pub max_tilt_deg: f64,

    #[serde(default = "default_geofence_enabled")]
    pub geofence_enabled: bool,

    #[serde(rename = "geofence_radius", default = "default_geofence_radius")]
    pub geofence_radius_m: f64,
}

/// Background loop and safety log settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Keep at most this many entries in memory. Unbounded when absent.
    #[serde(default)]
    pub log_capacity: Option<usize>,

    #[serde(default = "default_log_file")]
    pub log_file: String,

    /// Directory for rotated tracing output. Console only when absent.
    #[serde(default)]
    pub trace_dir: Option<String>,
}

// Default value functions
fn default_max_altitude() -> f64 { 10.0 }
fn default_min_battery() -> f64 { 20.0 }
fn default_max_tilt() -> f64 { 45.0 }
fn default_geofence_enabled() -> bool { true }
fn default_geofence_radius() -> f64 { 100.0 }

fn default_poll_interval_ms() -> u64 { 500 }
fn default_stop_timeout_ms() -> u64 { 2000 }
fn default_log_file() -> String { "safety_log.txt".to_string() }

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_altitude_m: default_max_altitude(),
            min_battery_pct: default_min_battery(),
            max_tilt_deg: default_max_tilt(),
            geofence_enabled: default_geofence_enabled(),
            geofence_radius_m: default_geofence_radius(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            log_capacity: None,
            log_file: default_log_file(),
            trace_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use drone_safety::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.safety.validate()?;
        self.monitor.validate()
    }
}

impl SafetyConfig {
    /// Validate thresholds
    ///
    /// # Errors
    ///
    /// Returns [`SafetyError::Config`] if any threshold is not positive and finite.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("max_altitude", self.max_altitude_m),
            ("min_battery", self.min_battery_pct),
            ("max_tilt_angle", self.max_tilt_deg),
            ("geofence_radius", self.geofence_radius_m),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(SafetyError::Config(format!(
                    "{} must be positive and finite (got {})",
                    name, value
                )));
            }
        }

        if self.min_battery_pct > 100.0 {
            return Err(SafetyError::Config(
                "min_battery must not exceed 100".to_string(),
            ));
        }

        if self.max_tilt_deg >= 180.0 {
            return Err(SafetyError::Config(
                "max_tilt_angle must be below 180".to_string(),
            ));
        }

        Ok(())
    }

    /// Advisory descent target when the altitude ceiling is breached
    #[must_use]
    pub fn safe_altitude_m(&self) -> f64 {
        self.max_altitude_m * 0.8
    }
}

impl MonitorConfig {
    fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 || self.poll_interval_ms > 60000 {
            return Err(SafetyError::Config(
                "poll_interval_ms must be between 1 and 60000".to_string(),
            ));
        }

        if self.stop_timeout_ms == 0 || self.stop_timeout_ms > 60000 {
            return Err(SafetyError::Config(
                "stop_timeout_ms must be between 1 and 60000".to_string(),
            ));
        }

        if self.log_capacity == Some(0) {
            return Err(SafetyError::Config(
                "log_capacity must be greater than 0 when set".to_string(),
            ));
        }

        if self.log_file.is_empty() {
            return Err(SafetyError::Config("log_file cannot be empty".to_string()));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}
