//! Trait abstraction for the flight controller link to enable testing

use async_trait::async_trait;

use super::{FlightMode, TelemetrySnapshot};
use crate::error::Result;

/// Telemetry and command operations the safety core needs from a vehicle
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VehicleLink: Send + Sync {
    /// Pull a fresh telemetry snapshot
    ///
    /// # Errors
    ///
    /// Returns [`SafetyError::TelemetryUnavailable`](crate::error::SafetyError::TelemetryUnavailable)
    /// when no current telemetry can be read.
    async fn snapshot(&self) -> Result<TelemetrySnapshot>;

    /// Switch the vehicle into `mode`
    ///
    /// # Errors
    ///
    /// Returns [`SafetyError::CommandRejected`](crate::error::SafetyError::CommandRejected)
    /// when the flight controller refuses the change.
    async fn set_mode(&self, mode: FlightMode) -> Result<()>;
}
