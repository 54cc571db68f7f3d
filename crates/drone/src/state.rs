//! Drone mission states

use emberwatch_core::{Coordinate, Fault, ZoneId};
use emberwatch_transport::DronePhase;
use serde::{Deserialize, Serialize};

/// Work order a drone is carrying out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    /// Destination zone
    pub zone_id: ZoneId,
    /// Zone center
    pub target: Coordinate,
    /// Fault injected with the dispatch
    pub fault: Fault,
}

/// Drone state machine states.
///
/// `Faulted` is terminal: no event leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DroneState {
    /// Waiting for a dispatch
    Idle,
    /// Flying to the mission target; `arrived` once the target is reached
    /// and the drone hovers awaiting its drop order
    OnRoute {
        /// Current mission
        mission: Mission,
        /// Target reached, arrival announced
        arrived: bool,
    },
    /// Releasing agent
    DroppingAgent {
        /// Current mission
        mission: Mission,
        /// Requested volume (liters)
        volume_liters: f64,
    },
    /// Taking on water
    Refilling,
    /// Out of service for the rest of the run
    Faulted {
        /// Fault that was realized
        fault: Fault,
    },
}

impl DroneState {
    /// Wire-level phase of this state
    pub fn phase(&self) -> DronePhase {
        match self {
            DroneState::Idle => DronePhase::Idle,
            DroneState::OnRoute { .. } => DronePhase::OnRoute,
            DroneState::DroppingAgent { .. } => DronePhase::DroppingAgent,
            DroneState::Refilling => DronePhase::Refilling,
            DroneState::Faulted { .. } => DronePhase::Faulted,
        }
    }

    /// Whether the state has no outgoing transition
    pub fn is_terminal(&self) -> bool {
        match self {
            DroneState::Faulted { fault } => fault.is_terminal(),
            _ => false,
        }
    }

    /// Mission being worked, if any
    pub fn mission(&self) -> Option<&Mission> {
        match self {
            DroneState::OnRoute { mission, .. } | DroneState::DroppingAgent { mission, .. } => {
                Some(mission)
            }
            _ => None,
        }
    }
}
