//! Core domain types shared by the scheduler, the drones and the transport.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Drone identifier, unique across the fleet.
pub type DroneId = u32;

/// Zone identifier. Zone `0` is reserved for the base.
pub type ZoneId = u32;

/// Incident identifier, assigned by the incident source in feed order.
pub type IncidentId = u64;

/// Zone id used when a drone is sent home.
pub const BASE_ZONE_ID: ZoneId = 0;

/// World position in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    /// East-west position
    pub x: f64,
    /// North-south position
    pub y: f64,
}

impl Coordinate {
    /// The base all drones start from and return to.
    pub const BASE: Coordinate = Coordinate { x: 0.0, y: 0.0 };

    /// Create a new coordinate
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another coordinate
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

/// Axis-aligned rectangle given by two opposite corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// First corner
    pub start: Coordinate,
    /// Opposite corner
    pub end: Coordinate,
}

impl Bounds {
    /// Create bounds from corner coordinates
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            start: Coordinate::new(x1, y1),
            end: Coordinate::new(x2, y2),
        }
    }

    /// Midpoint of the rectangle
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.start.x + self.end.x) / 2.0,
            (self.start.y + self.end.y) / 2.0,
        )
    }
}

/// A registered fire zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Zone identifier
    pub id: ZoneId,
    /// Rectangular extent
    pub bounds: Bounds,
    /// Cached center, the dispatch target
    pub center: Coordinate,
}

impl Zone {
    /// Create a zone and cache its center
    pub fn new(id: ZoneId, bounds: Bounds) -> Self {
        Self {
            id,
            bounds,
            center: bounds.center(),
        }
    }
}

/// Fire intensity reported for a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// No fire
    None,
    /// Small fire
    Low,
    /// Medium fire
    Moderate,
    /// Large fire
    High,
}

impl Severity {
    /// Liters of suppression agent needed to put the fire out
    pub fn required_liters(&self) -> f64 {
        match self {
            Severity::None => 0.0,
            Severity::Low => 10.0,
            Severity::Moderate => 20.0,
            Severity::High => 30.0,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::None => "NONE",
            Severity::Low => "LOW",
            Severity::Moderate => "MODERATE",
            Severity::High => "HIGH",
        };
        f.write_str(label)
    }
}

/// Injected test condition attached to a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Fault {
    /// Normal operation
    #[default]
    None,
    /// Drone faults right after takeoff and never arrives
    DroneStuckInFlight,
    /// Drone arrives but faults instead of completing the drop
    NozzleJammed,
    /// One outbound message to the scheduler is silently lost
    PacketLoss,
}

impl Fault {
    /// Whether realizing this fault takes the drone out of service
    pub fn is_terminal(&self) -> bool {
        matches!(self, Fault::DroneStuckInFlight | Fault::NozzleJammed)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Fault::None => "NONE",
            Fault::DroneStuckInFlight => "DRONE_STUCK_IN_FLIGHT",
            Fault::NozzleJammed => "NOZZLE_JAMMED",
            Fault::PacketLoss => "PACKET_LOSS",
        };
        f.write_str(label)
    }
}
