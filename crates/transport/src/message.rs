//! Message variants exchanged between the incident source, the scheduler
//! and the drones.
//!
//! Messages are immutable once built and self-describing on the wire: the
//! `type` tag names the variant, so a receiver never relies on arrival order
//! to interpret a frame.

use emberwatch_core::{Coordinate, DroneId, Fault, IncidentId, Severity, Zone, ZoneId};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Network address a worker receives on.
pub type Endpoint = SocketAddr;

/// Mission phase of a drone as reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DronePhase {
    /// Waiting at its last position for work
    Idle,
    /// Flying toward a zone, or hovering there awaiting a drop order
    OnRoute,
    /// Releasing agent over a zone
    DroppingAgent,
    /// Taking on water
    Refilling,
    /// Permanently out of service
    Faulted,
}

impl DronePhase {
    /// Human-readable label for logs and the dashboard
    pub fn as_str(&self) -> &'static str {
        match self {
            DronePhase::Idle => "Idle",
            DronePhase::OnRoute => "On Route",
            DronePhase::DroppingAgent => "Dropping Agent",
            DronePhase::Refilling => "Refilling",
            DronePhase::Faulted => "Faulted",
        }
    }
}

/// Drone state as seen by the drone itself when it reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneSnapshot {
    /// Reporting drone
    pub drone_id: DroneId,
    /// Per-drone report counter, strictly increasing
    pub seq: u64,
    /// Current phase
    pub phase: DronePhase,
    /// Current position
    pub position: Coordinate,
    /// Remaining flight budget (seconds)
    pub flight_time_remaining: f64,
    /// Water on board (liters)
    pub water_level: f64,
    /// Where the drone receives commands
    pub endpoint: Endpoint,
}

/// Every unit of communication in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Zone definition from the incident source
    ZoneRegistration {
        /// The zone being registered
        zone: Zone,
    },
    /// New fire in a zone; re-sent with the same id until the zone is out
    IncidentReport {
        /// Source-assigned id, used to drop repeated reports
        incident_id: IncidentId,
        /// Burning zone
        zone_id: ZoneId,
        /// Fire intensity
        severity: Severity,
        /// Fault to inject into the first dispatch for this incident
        #[serde(default)]
        fault: Fault,
    },
    /// Scheduler orders a drone to a zone
    DispatchOrder {
        /// Destination zone
        zone_id: ZoneId,
        /// Zone center
        target: Coordinate,
        /// Injected test condition
        fault: Fault,
    },
    /// Scheduler orders a drone to release agent
    DropOrder {
        /// Requested volume (liters)
        volume_liters: f64,
    },
    /// Drone reached its zone
    ArrivedNotice {
        /// Reporting drone
        drone_id: DroneId,
        /// Zone reached
        zone_id: ZoneId,
    },
    /// Drone finished a drop
    DropConfirmation {
        /// Reporting drone
        drone_id: DroneId,
        /// Volume actually released (liters)
        volume_liters: f64,
    },
    /// Drone state report
    DroneStatusUpdate {
        /// Reported state
        snapshot: DroneSnapshot,
    },
    /// Scheduler probe sent when a drone's assignment stalls
    ReassignRequest {
        /// Probed drone
        drone_id: DroneId,
    },
    /// Return to base and stop
    ShutdownOrder,
    /// Zone demand reached zero
    FireExtinguished {
        /// Extinguished zone
        zone_id: ZoneId,
        /// Newest incident the cleared demand included
        last_incident: IncidentId,
    },
    /// Incident feed is exhausted and every reported fire is out.
    /// The scheduler answers with `ShutdownOrder`.
    NoMoreIncidents,
}

impl Message {
    /// Variant name, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Message::ZoneRegistration { .. } => "zone_registration",
            Message::IncidentReport { .. } => "incident_report",
            Message::DispatchOrder { .. } => "dispatch_order",
            Message::DropOrder { .. } => "drop_order",
            Message::ArrivedNotice { .. } => "arrived_notice",
            Message::DropConfirmation { .. } => "drop_confirmation",
            Message::DroneStatusUpdate { .. } => "drone_status_update",
            Message::ReassignRequest { .. } => "reassign_request",
            Message::ShutdownOrder => "shutdown_order",
            Message::FireExtinguished { .. } => "fire_extinguished",
            Message::NoMoreIncidents => "no_more_incidents",
        }
    }
}

/// A received message together with the endpoint it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Sender endpoint
    pub from: Endpoint,
    /// Decoded message
    pub message: Message,
}
