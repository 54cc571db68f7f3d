//! Core functionality for the Emberwatch firefighting fleet.
//!
//! This crate provides the domain types, flight model, configuration and
//! logging shared by the scheduler, the drones and the transport.

pub mod config;
pub mod error;
pub mod flight;
pub mod logging;
pub mod types;

pub use config::{
    DroneConfig, EmberwatchConfig, IncidentConfig, NetworkConfig, SchedulerConfig,
    SimulationConfig, TransportKind, ZoneConfig,
};
pub use error::{CoreError, CoreResult};
pub use flight::{has_enough_battery, round_trip_time, time_to_zone};
pub use types::{
    Bounds, Coordinate, DroneId, Fault, IncidentId, Severity, Zone, ZoneId, BASE_ZONE_ID,
};
