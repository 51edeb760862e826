//! In-process simulated vehicle
//!
//! Holds a mutable telemetry snapshot behind a mutex and implements
//! [`VehicleLink`] against it. Faults can be injected: telemetry outage and
//! per-mode command rejection.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{FlightMode, TelemetrySnapshot, VehicleLink};
use crate::error::{Result, SafetyError};

#[derive(Debug, Default)]
struct SimState {
    snapshot: TelemetrySnapshot,
    telemetry_down: bool,
    rejected: HashSet<FlightMode>,
    mode_history: Vec<FlightMode>,
}

/// Simulated vehicle for demos and tests
#[derive(Debug, Default)]
pub struct SimulatedVehicle {
    state: Mutex<SimState>,
}

impl SimulatedVehicle {
    /// Create a simulated vehicle reporting `snapshot`
    #[must_use]
    pub fn new(snapshot: TelemetrySnapshot) -> Self {
        Self {
            state: Mutex::new(SimState {
                snapshot,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate the reported telemetry in place
    ///
    /// # Examples
    ///
    /// ```
    /// use drone_safety::vehicle::SimulatedVehicle;
    ///
    /// let sim = SimulatedVehicle::default();
    /// sim.update(|s| s.altitude_m = 12.0);
    /// assert_eq!(sim.current().altitude_m, 12.0);
    /// ```
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut TelemetrySnapshot),
    {
        f(&mut self.state().snapshot);
    }

    /// Copy of the telemetry currently reported
    #[must_use]
    pub fn current(&self) -> TelemetrySnapshot {
        self.state().snapshot.clone()
    }

    /// Simulate a telemetry outage (`false`) or recovery (`true`)
    pub fn set_telemetry_available(&self, available: bool) {
        self.state().telemetry_down = !available;
    }

    /// Make the vehicle refuse future changes into `mode`
    pub fn reject_mode(&self, mode: FlightMode) {
        self.state().rejected.insert(mode);
    }

    /// Every mode change accepted so far, oldest first
    #[must_use]
    pub fn mode_history(&self) -> Vec<FlightMode> {
        self.state().mode_history.clone()
    }
}

#[async_trait]
impl VehicleLink for SimulatedVehicle {
    async fn snapshot(&self) -> Result<TelemetrySnapshot> {
        let state = self.state();
        if state.telemetry_down {
            return Err(SafetyError::TelemetryUnavailable(
                "simulated link down".to_string(),
            ));
        }
        Ok(state.snapshot.clone())
    }

    async fn set_mode(&self, mode: FlightMode) -> Result<()> {
        let mut state = self.state();
        if state.rejected.contains(&mode) {
            return Err(SafetyError::CommandRejected {
                mode: mode.label().to_string(),
                reason: "simulated rejection".to_string(),
            });
        }
        state.snapshot.mode = mode.label().to_string();
        state.mode_history.push(mode);
        Ok(())
    }
}
