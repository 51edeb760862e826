//! # Emergency Dispatcher
//!
//! Turns the failing checks of one tick into at most one corrective command.
//!
//! ## Priority
//!
//! When several invariants fail in the same tick, the first matching rule in
//! [`PRIORITY`] wins:
//!
//! | # | Failing invariant | Action                     | Precondition |
//! |---|-------------------|----------------------------|--------------|
//! | 1 | Battery           | Return to launch (`RTL`)   | home set     |
//! | 2 | Tilt              | Emergency land (`LAND`)    |              |
//! | 3 | Geofence          | Return to launch (`RTL`)   |              |
//! | 4 | Altitude          | Descend to 80% of ceiling  |              |
//!
//! A battery failure without a home position falls through to the next rule.
//!
//! ## Single flight
//!
//! An atomic guard admits one episode at a time; a call made while another is
//! in flight returns `None` without touching the vehicle. The guard is released
//! when the call returns, whatever the outcome.
//!
//! ## Fallback
//!
//! If the vehicle rejects the selected mode change, or does not acknowledge it
//! within the command timeout, the dispatcher logs the cause and commands
//! `LAND` unconditionally. Fallback failures are logged,
//! never propagated.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::invariants::{CheckResult, Invariant};
use super::log::SafetyLog;
use crate::config::SafetyConfig;
use crate::error::{Result, SafetyError};
use crate::vehicle::{FlightMode, VehicleLink};

/// How long a mode change may go unacknowledged before it counts as rejected
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(500);

/// A corrective action chosen for an emergency episode
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CorrectiveAction {
    ReturnToLaunch,
    EmergencyLand,
    /// Advisory descent target; does not change flight mode
    DescendTo { altitude_m: f64 },
}

impl CorrectiveAction {
    /// Mode change required by this action, if any
    #[must_use]
    pub fn flight_mode(&self) -> Option<FlightMode> {
        match self {
            CorrectiveAction::ReturnToLaunch => Some(FlightMode::Rtl),
            CorrectiveAction::EmergencyLand => Some(FlightMode::Land),
            CorrectiveAction::DescendTo { .. } => None,
        }
    }
}

impl fmt::Display for CorrectiveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectiveAction::ReturnToLaunch => write!(f, "return to launch"),
            CorrectiveAction::EmergencyLand => write!(f, "emergency land"),
            CorrectiveAction::DescendTo { altitude_m } => {
                write!(f, "descend to safe altitude {:.1}", altitude_m)
            }
        }
    }
}

/// One entry of the priority table
#[derive(Clone, Copy)]
pub struct Rule {
    pub trigger: Invariant,
    pub requires_home: bool,
    pub response: fn(&SafetyConfig) -> CorrectiveAction,
}

fn return_to_launch(_: &SafetyConfig) -> CorrectiveAction {
    CorrectiveAction::ReturnToLaunch
}

fn emergency_land(_: &SafetyConfig) -> CorrectiveAction {
    CorrectiveAction::EmergencyLand
}

fn descend_to_safe_altitude(config: &SafetyConfig) -> CorrectiveAction {
    CorrectiveAction::DescendTo {
        altitude_m: config.safe_altitude_m(),
    }
}

/// Dispatch priority, highest first
pub const PRIORITY: [Rule; 4] = [
    Rule { trigger: Invariant::Battery, requires_home: true, response: return_to_launch },
    Rule { trigger: Invariant::Tilt, requires_home: false, response: emergency_land },
    Rule { trigger: Invariant::Geofence, requires_home: false, response: return_to_launch },
    Rule { trigger: Invariant::Altitude, requires_home: false, response: descend_to_safe_altitude },
];

/// Pick the corrective action for a set of failing checks
///
/// Pure; passing checks in `failures` are ignored.
///
/// # Examples
///
/// ```
/// use drone_safety::config::SafetyConfig;
/// use drone_safety::safety::dispatcher::{select_action, CorrectiveAction};
///
/// let config = SafetyConfig::default();
/// assert_eq!(select_action(&[], true, &config), None);
/// ```
#[must_use]
pub fn select_action(
    failures: &[CheckResult],
    home_set: bool,
    config: &SafetyConfig,
) -> Option<CorrectiveAction> {
    PRIORITY
        .iter()
        .filter(|rule| home_set || !rule.requires_home)
        .find(|rule| {
            failures
                .iter()
                .any(|check| !check.passed && check.invariant == rule.trigger)
        })
        .map(|rule| (rule.response)(config))
}

/// Releases the episode guard when dropped
struct EpisodeGuard<'a>(&'a AtomicBool);

impl Drop for EpisodeGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Issues corrective commands, one episode at a time
pub struct EmergencyDispatcher {
    vehicle: Arc<dyn VehicleLink>,
    log: Arc<SafetyLog>,
    config: SafetyConfig,
    command_timeout: Duration,
    in_progress: AtomicBool,
}

impl fmt::Debug for EmergencyDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmergencyDispatcher")
            .field("in_progress", &self.is_handling())
            .finish_non_exhaustive()
    }
}

impl EmergencyDispatcher {
    pub fn new(vehicle: Arc<dyn VehicleLink>, log: Arc<SafetyLog>, config: SafetyConfig) -> Self {
        Self {
            vehicle,
            log,
            config,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            in_progress: AtomicBool::new(false),
        }
    }

    /// Bound each mode change by `command_timeout`
    #[must_use]
    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    /// Whether an episode is currently in flight
    #[must_use]
    pub fn is_handling(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Run one emergency episode for the given failures
    ///
    /// # Arguments
    ///
    /// * `failures` - Failing checks from the current tick
    /// * `home_set` - Whether a home position is recorded
    ///
    /// # Returns
    ///
    /// * `Some(action)` - The action actually commanded. After a rejected
    ///   command this is [`CorrectiveAction::EmergencyLand`].
    /// * `None` - Nothing failed, no rule matched, or another episode was in flight
    pub async fn handle(&self, failures: &[CheckResult], home_set: bool) -> Option<CorrectiveAction> {
        let action = select_action(failures, home_set, &self.config)?;

        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Emergency already in progress, skipping {}", action);
            return None;
        }
        let _guard = EpisodeGuard(&self.in_progress);

        warn!("EMERGENCY PROTOCOL ACTIVATED: {}", action);
        self.log.append(format!("Emergency response: {}", action));

        let Some(mode) = action.flight_mode() else {
            info!("Advisory: {}", action);
            return Some(action);
        };

        match self.command(mode).await {
            Ok(()) => {
                info!("Vehicle switched to {}", mode);
                Some(action)
            }
            Err(e) => {
                error!("Emergency handling failed ({}): {}", action, e);
                self.log.append(format!(
                    "Emergency command '{}' failed: {}; falling back to emergency land",
                    action, e
                ));
                self.land_unconditionally().await;
                Some(CorrectiveAction::EmergencyLand)
            }
        }
    }

    /// Issue a mode change, treating a missing acknowledgement as a rejection
    async fn command(&self, mode: FlightMode) -> Result<()> {
        match timeout(self.command_timeout, self.vehicle.set_mode(mode)).await {
            Ok(result) => result,
            Err(_) => Err(SafetyError::CommandRejected {
                mode: mode.label().to_string(),
                reason: format!("no acknowledgement within {:?}", self.command_timeout),
            }),
        }
    }

    async fn land_unconditionally(&self) {
        match self.command(FlightMode::Land).await {
            Ok(()) => info!("Fallback emergency landing commanded"),
            Err(e) => {
                error!("Fallback emergency landing failed: {}", e);
                self.log.append(format!("Fallback emergency land failed: {}", e));
            }
        }
    }
}
