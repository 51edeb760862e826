//! # Drone Safety Monitor
//!
//! Runs the safety invariant monitor against a simulated vehicle.
//!
//! The simulated vehicle flies a scripted profile that eventually climbs
//! through the altitude ceiling, drains its battery and drifts out of the
//! geofence, so every corrective path of the monitor is exercised.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use drone_safety::config::Config;
use drone_safety::geofence::GeoPoint;
use drone_safety::safety::SafetyMonitor;
use drone_safety::vehicle::{FlightMode, SimulatedVehicle, TelemetrySnapshot, VehicleLink};

/// Configuration file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Simulated takeoff point
const HOME: GeoPoint = GeoPoint { lat: 13.7563, lon: 100.5018 };

/// Period between simulation steps and status reports
const STATUS_INTERVAL_MS: u64 = 1000;

/// Main entry point
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first CLI argument, else `config/default.toml`, else defaults)
///    - Set up logging with tracing subscriber (plus rotated file output if configured)
///    - Create the simulated vehicle, record home and start monitoring
///
/// 2. **Main Loop**
///    - Advance the simulated flight once per second
///    - Log the status report as JSON
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Stop the monitoring loop
///    - Export the safety log to `monitor.log_file`
///
/// # Errors
///
/// Returns error if the configuration is invalid or the log cannot be written.
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    let _trace_guard = init_tracing(&config);

    info!("Drone Safety Monitor v{} starting...", env!("CARGO_PKG_VERSION"));

    let sim = Arc::new(SimulatedVehicle::new(TelemetrySnapshot {
        lat: HOME.lat,
        lon: HOME.lon,
        ..Default::default()
    }));
    let vehicle: Arc<dyn VehicleLink> = sim.clone();
    let monitor = SafetyMonitor::new(Some(vehicle), &config)?;

    monitor.set_home().await;
    monitor.start_monitoring();

    info!("Press Ctrl+C to exit");

    let mut status_interval = interval(Duration::from_millis(STATUS_INTERVAL_MS));
    let mut step: u64 = 0;

    loop {
        tokio::select! {
            _ = status_interval.tick() => {
                advance_flight(&sim, step);
                step += 1;

                match monitor.status().await.to_json() {
                    Ok(json) => info!("status {}", json),
                    Err(e) => warn!("Failed to serialize status: {}", e),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    monitor.stop_monitoring().await;

    let written = monitor
        .export_log(&config.monitor.log_file)
        .with_context(|| format!("writing safety log to {}", config.monitor.log_file))?;
    info!("Exported {} safety log entries", written);

    Ok(())
}

fn load_config() -> Result<Config> {
    match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("loading {}", path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Config::load(DEFAULT_CONFIG_PATH).with_context(|| format!("loading {}", DEFAULT_CONFIG_PATH))
        }
        None => Ok(Config::default()),
    }
}

/// Console logging, plus a daily-rotated file when `monitor.trace_dir` is set
///
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());

    match &config.monitor.trace_dir {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "drone-safety.log"));
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

/// Advance the scripted flight by one step
///
/// Climbs 0.5 m, drains 1.5% battery and drifts ~5.5 m north per step while
/// under pilot control. RTL flies back toward home; LAND descends in place.
fn advance_flight(sim: &SimulatedVehicle, step: u64) {
    let t = step as f64;

    sim.update(|s| {
        s.pitch_rad = 0.15 * (t * 0.7).sin();
        s.roll_rad = 0.10 * (t * 0.9).cos();
        s.battery_pct = (s.battery_pct - 1.5).max(0.0);

        if s.mode == FlightMode::Land.label() {
            s.altitude_m = (s.altitude_m - 1.0).max(0.0);
        } else if s.mode == FlightMode::Rtl.label() {
            s.lat = HOME.lat + (s.lat - HOME.lat) * 0.7;
            s.lon = HOME.lon + (s.lon - HOME.lon) * 0.7;
        } else {
            s.altitude_m = (s.altitude_m + 0.5).min(14.0);
            s.lat += 0.00005;
        }
    });
}
