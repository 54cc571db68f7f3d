//! Drone identity and live mission data

use emberwatch_core::{Coordinate, DroneConfig, DroneId};
use emberwatch_transport::{DroneSnapshot, Endpoint};
use serde::{Deserialize, Serialize};

use crate::state::DroneState;

/// Fleet-wide drone parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DroneParams {
    /// Tank size (liters)
    pub water_capacity_l: f64,
    /// Flight budget of a fresh battery (seconds)
    pub flight_time_capacity_s: f64,
    /// Drop duration per liter released (seconds)
    pub drop_seconds_per_liter: f64,
}

impl Default for DroneParams {
    fn default() -> Self {
        Self::from(&DroneConfig::default())
    }
}

impl From<&DroneConfig> for DroneParams {
    fn from(config: &DroneConfig) -> Self {
        Self {
            water_capacity_l: config.water_capacity_l,
            flight_time_capacity_s: config.flight_time_capacity_s,
            drop_seconds_per_liter: config.drop_seconds_per_liter,
        }
    }
}

/// Everything a drone knows about itself.
///
/// Only the drone's own transitions mutate this; the scheduler learns about
/// it exclusively from the messages the drone sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneInfo {
    /// Fleet-unique identifier
    pub id: DroneId,
    /// State machine state
    pub state: DroneState,
    /// Current position
    pub position: Coordinate,
    /// Remaining flight budget (seconds), never negative
    pub flight_time_remaining: f64,
    /// Water on board (liters)
    pub water_level: f64,
    /// Where this drone receives commands
    pub endpoint: Endpoint,
    /// Next outbound message is lost (PACKET_LOSS injection)
    pub packet_loss_armed: bool,
    /// Sequence number of the last status report sent
    pub status_seq: u64,
}

impl DroneInfo {
    /// A fresh drone: idle at base, full battery, full tank
    pub fn new(id: DroneId, endpoint: Endpoint, params: &DroneParams) -> Self {
        Self {
            id,
            state: DroneState::Idle,
            position: Coordinate::BASE,
            flight_time_remaining: params.flight_time_capacity_s,
            water_level: params.water_capacity_l,
            endpoint,
            packet_loss_armed: false,
            status_seq: 0,
        }
    }

    /// Charge `seconds` of flight against the battery
    pub fn consume_flight_time(&mut self, seconds: f64) {
        self.flight_time_remaining = (self.flight_time_remaining - seconds).max(0.0);
    }

    /// Build the next status report, advancing the sequence number
    pub fn next_snapshot(&mut self) -> DroneSnapshot {
        self.status_seq += 1;
        DroneSnapshot {
            drone_id: self.id,
            seq: self.status_seq,
            phase: self.state.phase(),
            position: self.position,
            flight_time_remaining: self.flight_time_remaining,
            water_level: self.water_level,
            endpoint: self.endpoint,
        }
    }
}
