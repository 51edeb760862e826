//! # Safety Monitor
//!
//! Runs a background task that evaluates the safety invariants on a fixed
//! cadence and hands failures to the emergency dispatcher.
//!
//! ## Tick
//!
//! Every poll interval (500 ms by default) the loop:
//!
//! 1. Pulls one telemetry snapshot from the vehicle link, waiting at most one
//!    interval for it
//! 2. Runs altitude, battery, tilt and geofence checks, in that order
//! 3. Appends one safety log entry per failing check
//! 4. Passes the failures to [`EmergencyDispatcher::handle`]
//!
//! Each tick runs as its own task; a tick that errors or panics is logged and
//! the next tick still runs. Worst-case detection latency is one interval.
//!
//! ## Shared state
//!
//! The safety log, the home position and the emergency guard are shared
//! between the loop and foreground callers and are only touched under a
//! lock or atomically. Thresholds are immutable after construction.
//!
//! ## Simulation mode
//!
//! Without a vehicle link every check passes vacuously and the status report
//! reads `SIMULATION`, so operators are never blocked when there is no real
//! telemetry.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::dispatcher::EmergencyDispatcher;
use super::invariants::{evaluate_all, CheckResult};
use super::log::{SafetyLog, SafetyLogEntry};
use super::status::{StatusReport, NO_TELEMETRY_MODE, SIMULATION_MODE};
use crate::config::{Config, SafetyConfig};
use crate::error::{Result, SafetyError};
use crate::geofence::GeoPoint;
use crate::vehicle::{TelemetrySnapshot, VehicleLink};

/// Lifecycle flags observable by operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorState {
    pub monitoring: bool,
    pub emergency_in_progress: bool,
}

/// Result of the most recent evaluation
#[derive(Debug, Clone)]
struct Evaluation {
    snapshot: TelemetrySnapshot,
    checks: [CheckResult; 4],
}

/// State shared between the background loop and foreground callers
struct Shared {
    config: SafetyConfig,
    poll_interval: Duration,
    vehicle: Option<Arc<dyn VehicleLink>>,
    dispatcher: Option<EmergencyDispatcher>,
    log: Arc<SafetyLog>,
    home: RwLock<Option<GeoPoint>>,
    latest: RwLock<Option<Evaluation>>,
    monitoring: AtomicBool,
    telemetry_lost: AtomicBool,
}

impl Shared {
    fn home(&self) -> Option<GeoPoint> {
        *self.home.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn latest(&self) -> Option<Evaluation> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store_latest(&self, snapshot: TelemetrySnapshot, checks: [CheckResult; 4]) {
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) =
            Some(Evaluation { snapshot, checks });
    }

    fn emergency_in_progress(&self) -> bool {
        self.dispatcher
            .as_ref()
            .is_some_and(EmergencyDispatcher::is_handling)
    }

    /// One snapshot request, bounded by the poll interval
    async fn request_snapshot(&self, vehicle: &dyn VehicleLink) -> Result<TelemetrySnapshot> {
        match timeout(self.poll_interval, vehicle.snapshot()).await {
            Ok(result) => result,
            Err(_) => Err(SafetyError::TelemetryUnavailable(format!(
                "no snapshot within {:?}",
                self.poll_interval
            ))),
        }
    }

    /// Pull a snapshot, logging an outage once per occurrence
    ///
    /// Returns `None` in simulation mode or while telemetry is unavailable.
    async fn fetch(&self) -> Option<TelemetrySnapshot> {
        let vehicle = self.vehicle.as_deref()?;

        match self.request_snapshot(vehicle).await {
            Ok(snapshot) => {
                if self.telemetry_lost.swap(false, Ordering::AcqRel) {
                    info!("Telemetry restored");
                }
                Some(snapshot)
            }
            Err(e) => {
                if !self.telemetry_lost.swap(true, Ordering::AcqRel) {
                    warn!("{}; treating vehicle as safe until telemetry returns", e);
                    self.log.append(e.to_string());
                }
                None
            }
        }
    }

    /// Append one log entry per failing check and return the failures
    fn record_failures(&self, checks: &[CheckResult]) -> Vec<CheckResult> {
        checks
            .iter()
            .filter(|check| !check.passed)
            .map(|check| {
                let entry = self.log.append(check.message.as_str());
                warn!("{}", entry);
                check.clone()
            })
            .collect()
    }

    async fn tick(self: Arc<Self>) {
        let Some(snapshot) = self.fetch().await else {
            return;
        };

        let home = self.home();
        let checks = evaluate_all(&snapshot, &self.config, home);
        let failures = self.record_failures(&checks);
        self.store_latest(snapshot, checks);

        if failures.is_empty() {
            return;
        }

        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.handle(&failures, home.is_some()).await;
        }
    }
}

async fn run_loop(shared: Arc<Shared>, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = interval(shared.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    // Monitor dropped without stopping
                    break;
                }
            }
        }

        if *stop_rx.borrow() {
            break;
        }

        if let Err(e) = tokio::spawn(Arc::clone(&shared).tick()).await {
            error!("Safety tick aborted: {}", e);
        }
    }

    info!("Safety monitoring stopped");
}

struct LoopHandle {
    task: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
}

/// Runtime safety invariant monitor
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use drone_safety::config::Config;
/// use drone_safety::safety::SafetyMonitor;
/// use drone_safety::vehicle::{SimulatedVehicle, VehicleLink};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let vehicle: Arc<dyn VehicleLink> = Arc::new(SimulatedVehicle::default());
///     let monitor = SafetyMonitor::new(Some(vehicle), &Config::default())?;
///
///     monitor.set_home().await;
///     monitor.start_monitoring();
///     println!("safe: {}", monitor.is_safe().await);
///     monitor.stop_monitoring().await;
///     Ok(())
/// }
/// ```
pub struct SafetyMonitor {
    shared: Arc<Shared>,
    task: Mutex<Option<LoopHandle>>,
    stop_timeout: Duration,
}

impl fmt::Debug for SafetyMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafetyMonitor")
            .field("config", &self.shared.config)
            .field("state", &self.state())
            .field("home", &self.home())
            .finish_non_exhaustive()
    }
}

impl SafetyMonitor {
    /// Create a monitor
    ///
    /// # Arguments
    ///
    /// * `vehicle` - Flight controller link, or `None` for simulation mode
    /// * `config` - Thresholds and loop settings
    ///
    /// # Errors
    ///
    /// Returns [`SafetyError::Config`](crate::error::SafetyError::Config) if
    /// any threshold is invalid. The monitor is never constructed in that case.
    pub fn new(vehicle: Option<Arc<dyn VehicleLink>>, config: &Config) -> Result<Self> {
        config.validate()?;

        let log = Arc::new(match config.monitor.log_capacity {
            Some(capacity) => SafetyLog::with_capacity(capacity),
            None => SafetyLog::new(),
        });

        let dispatcher = vehicle.as_ref().map(|vehicle| {
            EmergencyDispatcher::new(Arc::clone(vehicle), Arc::clone(&log), config.safety.clone())
                .with_command_timeout(config.monitor.poll_interval())
        });

        info!(
            "Safety monitor initialized: max altitude {}m, min battery {}%, max tilt {}°, geofence {}",
            config.safety.max_altitude_m,
            config.safety.min_battery_pct,
            config.safety.max_tilt_deg,
            if config.safety.geofence_enabled {
                format!("{}m", config.safety.geofence_radius_m)
            } else {
                "disabled".to_string()
            }
        );
        if vehicle.is_none() {
            warn!("No vehicle link attached, running in simulation mode");
        }

        Ok(Self {
            shared: Arc::new(Shared {
                config: config.safety.clone(),
                poll_interval: config.monitor.poll_interval(),
                vehicle,
                dispatcher,
                log,
                home: RwLock::new(None),
                latest: RwLock::new(None),
                monitoring: AtomicBool::new(false),
                telemetry_lost: AtomicBool::new(false),
            }),
            task: Mutex::new(None),
            stop_timeout: config.monitor.stop_timeout(),
        })
    }

    /// Thresholds in force
    #[must_use]
    pub fn config(&self) -> &SafetyConfig {
        &self.shared.config
    }

    /// Recorded home position, if any
    #[must_use]
    pub fn home(&self) -> Option<GeoPoint> {
        self.shared.home()
    }

    /// Record the vehicle's current position as home (call at takeoff)
    ///
    /// Without a vehicle link, or if the position cannot be read, this logs a
    /// warning and leaves home unchanged.
    ///
    /// # Returns
    ///
    /// * `Some(home)` - The recorded position
    /// * `None` - Nothing was recorded
    pub async fn set_home(&self) -> Option<GeoPoint> {
        let Some(vehicle) = self.shared.vehicle.as_deref() else {
            warn!("No vehicle connected, home position not set");
            return None;
        };

        let snapshot = match self.shared.request_snapshot(vehicle).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Cannot set home position: {}", e);
                return None;
            }
        };

        let home = snapshot.position();
        let previous = self
            .shared
            .home
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(home);

        if previous.is_some() {
            info!("Home position updated: {:.6}, {:.6}", home.lat, home.lon);
        } else {
            info!("Home position set: {:.6}, {:.6}", home.lat, home.lon);
        }
        Some(home)
    }

    /// Start the background evaluation loop
    ///
    /// Idempotent: if the loop is already running this logs a warning and
    /// returns. Must be called from within a Tokio runtime.
    pub fn start_monitoring(&self) {
        let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            warn!("Monitoring already running");
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(Arc::clone(&self.shared), stop_rx));
        self.shared.monitoring.store(true, Ordering::Release);
        *slot = Some(LoopHandle { task, stop_tx });

        info!("Safety monitoring started (every {:?})", self.shared.poll_interval);
    }

    /// Stop the background loop and wait for it to exit
    ///
    /// The loop observes the request within one poll interval. A dispatch that
    /// is already in flight finishes; no new tick starts. Waits at most the
    /// configured stop timeout. Safe to call when not running.
    pub async fn stop_monitoring(&self) {
        let handle = {
            let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
            self.shared.monitoring.store(false, Ordering::Release);
            slot.take()
        };

        let Some(LoopHandle { task, stop_tx }) = handle else {
            debug!("Safety monitoring not running");
            return;
        };

        // The receiver is gone if the loop already exited
        let _ = stop_tx.send(true);

        match timeout(self.stop_timeout, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Safety loop ended abnormally: {}", e),
            Err(_) => warn!(
                "Safety loop did not stop within {:?}, detaching",
                self.stop_timeout
            ),
        }
    }

    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        self.shared.monitoring.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn state(&self) -> MonitorState {
        MonitorState {
            monitoring: self.is_monitoring(),
            emergency_in_progress: self.shared.emergency_in_progress(),
        }
    }

    /// Evaluate all four invariants against fresh telemetry
    ///
    /// Every failing check is appended to the safety log. Returns `true` in
    /// simulation mode and while telemetry is unavailable.
    pub async fn is_safe(&self) -> bool {
        let Some(snapshot) = self.shared.fetch().await else {
            return true;
        };

        let checks = evaluate_all(&snapshot, &self.shared.config, self.shared.home());
        let safe = self.shared.record_failures(&checks).is_empty();
        self.shared.store_latest(snapshot, checks);
        safe
    }

    /// Composite status for dashboards
    ///
    /// Read-only: evaluates fresh telemetry without appending to the log. If
    /// the fetch fails the most recent evaluated snapshot is reported instead.
    pub async fn status(&self) -> StatusReport {
        let warnings = self.shared.log.total_appended();

        let mut report = match self.shared.vehicle.as_deref() {
            None => StatusReport::degraded(SIMULATION_MODE, warnings),
            Some(vehicle) => {
                let snapshot = match self.shared.request_snapshot(vehicle).await {
                    Ok(snapshot) => Some(snapshot),
                    Err(e) => {
                        debug!("Status using last known telemetry: {}", e);
                        self.shared.latest().map(|evaluation| evaluation.snapshot)
                    }
                };

                match snapshot {
                    Some(snapshot) => self.report_for(&snapshot, warnings),
                    None => StatusReport::degraded(NO_TELEMETRY_MODE, warnings),
                }
            }
        };

        let state = self.state();
        report.monitoring = state.monitoring;
        report.emergency_in_progress = state.emergency_in_progress;
        report
    }

    fn report_for(&self, snapshot: &TelemetrySnapshot, warnings: usize) -> StatusReport {
        let home = self.shared.home();
        let checks = evaluate_all(snapshot, &self.shared.config, home);

        StatusReport {
            safe: checks.iter().all(|check| check.passed),
            mode: snapshot.mode.clone(),
            altitude: snapshot.altitude_m,
            battery: snapshot.battery_pct,
            tilt_pitch: snapshot.pitch_deg(),
            tilt_roll: snapshot.roll_deg(),
            distance_from_home: home
                .map(|home| home.distance_to(&snapshot.position()))
                .unwrap_or(0.0),
            warnings,
            checks: checks.to_vec(),
            monitoring: false,
            emergency_in_progress: false,
        }
    }

    /// Per-check results from the most recent evaluation
    #[must_use]
    pub fn latest_checks(&self) -> Option<Vec<CheckResult>> {
        self.shared
            .latest()
            .map(|evaluation| evaluation.checks.to_vec())
    }

    /// Shared safety log
    #[must_use]
    pub fn log(&self) -> &Arc<SafetyLog> {
        &self.shared.log
    }

    /// Append an operator-supplied warning to the safety log
    pub fn log_warning(&self, message: &str) -> SafetyLogEntry {
        let entry = self.shared.log.append(message);
        warn!("{}", entry);
        entry
    }

    /// Most recent `n` log entries, oldest first
    #[must_use]
    pub fn recent_warnings(&self, n: usize) -> Vec<SafetyLogEntry> {
        self.shared.log.tail(n)
    }

    /// Write the safety log to `path`
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be written.
    pub fn export_log<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        self.shared.log.export(path)
    }
}
