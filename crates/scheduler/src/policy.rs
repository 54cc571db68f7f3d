//! Drone selection and stall deadlines

use emberwatch_core::{has_enough_battery, Coordinate, DroneId, SchedulerConfig};
use std::time::Duration;
use tokio::time::Instant;

use crate::fleet::{DroneRecord, FleetTable};
use crate::ledger::AssignmentLedger;

/// Whether `drone` may be sent to `target` right now.
pub fn is_eligible(drone: &DroneRecord, assignments: &AssignmentLedger, target: &Coordinate) -> bool {
    drone.is_available()
        && assignments.get(drone.id).is_none()
        && has_enough_battery(&drone.position, drone.flight_time_remaining, target)
}

/// First eligible drone in ascending id order.
pub fn select_drone(
    fleet: &FleetTable,
    assignments: &AssignmentLedger,
    target: &Coordinate,
) -> Option<DroneId> {
    fleet
        .iter()
        .find(|drone| is_eligible(drone, assignments, target))
        .map(|drone| drone.id)
}

/// How long the scheduler waits on each assignment stage, and how often it
/// repeats an unanswered probe or shutdown order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StallPolicy {
    /// Multiplier on the expected duration
    pub factor: f64,
    /// Added slack (simulated seconds)
    pub grace_s: f64,
    /// Drop duration per liter (simulated seconds)
    pub drop_seconds_per_liter: f64,
    /// Pause between repeated messages (simulated seconds)
    pub retry_s: f64,
    /// Wall seconds per simulated second
    pub time_scale: f64,
}

impl StallPolicy {
    /// Build from the scheduler settings and the fleet's drop rate
    pub fn new(config: &SchedulerConfig, drop_seconds_per_liter: f64, time_scale: f64) -> Self {
        Self {
            factor: config.stall_timeout_factor,
            grace_s: config.stall_timeout_grace_s,
            drop_seconds_per_liter,
            retry_s: config.retry_interval_s,
            time_scale,
        }
    }

    /// Allowed wait for `ArrivedNotice` after a dispatch of `travel_time_s`
    pub fn arrival_timeout(&self, travel_time_s: f64) -> Duration {
        self.scaled(travel_time_s * self.factor + self.grace_s)
    }

    /// Allowed wait for `DropConfirmation` after ordering `volume` liters
    pub fn drop_timeout(&self, volume: f64) -> Duration {
        self.scaled(volume * self.drop_seconds_per_liter * self.factor + self.grace_s)
    }

    /// Arrival deadline for a dispatch made at `now`
    pub fn arrival_deadline(&self, now: Instant, travel_time_s: f64) -> Instant {
        now + self.arrival_timeout(travel_time_s)
    }

    /// Drop deadline for an order made at `now`
    pub fn drop_deadline(&self, now: Instant, volume: f64) -> Instant {
        now + self.drop_timeout(volume)
    }

    /// Wait before repeating an unanswered message
    pub fn retry_interval(&self) -> Duration {
        self.scaled(self.retry_s)
    }

    /// When to repeat a message sent at `now`
    pub fn retry_deadline(&self, now: Instant) -> Instant {
        now + self.retry_interval()
    }

    fn scaled(&self, simulated_s: f64) -> Duration {
        Duration::try_from_secs_f64(simulated_s * self.time_scale).unwrap_or(Duration::ZERO)
    }
}

impl Default for StallPolicy {
    fn default() -> Self {
        Self::new(&SchedulerConfig::default(), 1.0, 1.0)
    }
}
