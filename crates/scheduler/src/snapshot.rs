//! Owned, read-only view of the scheduler's state for display.

use emberwatch_core::{Coordinate, DroneId, ZoneId};
use emberwatch_transport::DronePhase;
use serde::Serialize;

/// One zone as the dashboard sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneView {
    /// Zone identifier
    pub id: ZoneId,
    /// Dispatch target
    pub center: Coordinate,
    /// Liters still needed, zero when not burning
    pub outstanding_liters: f64,
    /// Drones currently assigned
    pub assigned_drones: Vec<DroneId>,
}

/// One drone as the dashboard sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroneView {
    /// Drone identifier
    pub id: DroneId,
    /// Last known or expected phase
    pub phase: DronePhase,
    /// Last known or expected position
    pub position: Coordinate,
    /// Shadow water estimate (liters)
    pub water_liters: f64,
    /// Estimated flight budget (seconds)
    pub flight_time_remaining: f64,
    /// Zone being worked
    pub assigned_zone: Option<ZoneId>,
    /// Stalled and written off until it reports again
    pub unresponsive: bool,
}

/// Everything the dashboard renders, published after every scheduler event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetSnapshot {
    /// Registered zones, ascending
    pub zones: Vec<ZoneView>,
    /// Known drones, ascending
    pub drones: Vec<DroneView>,
    /// Zones waiting for a drone, oldest first
    pub parked: Vec<ZoneId>,
    /// Shutdown broadcast has gone out
    pub shutting_down: bool,
    /// Number of zones extinguished so far
    pub extinguished: u32,
}

impl FleetSnapshot {
    /// Look up a zone view
    pub fn zone(&self, id: ZoneId) -> Option<&ZoneView> {
        self.zones.iter().find(|z| z.id == id)
    }

    /// Look up a drone view
    pub fn drone(&self, id: DroneId) -> Option<&DroneView> {
        self.drones.iter().find(|d| d.id == id)
    }

    /// Whether any zone still burns
    pub fn any_burning(&self) -> bool {
        self.zones.iter().any(|z| z.outstanding_liters > 0.0)
    }
}
