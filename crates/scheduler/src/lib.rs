//! Emberwatch Scheduler
//!
//! Central coordination for the drone fleet:
//! - Zone registry and fire ledger fed by the incident source
//! - First-fit, battery-feasible drone selection
//! - Stall detection and reassignment for drones that go silent
//! - Shutdown broadcast and acknowledgement drain
//! - Fleet snapshots for the dashboard
//!
//! `Scheduler` is the sans-IO core; `SchedulerService` drives it from a
//! transport and the clock. `IncidentSource` feeds it.

#![warn(missing_docs)]

pub mod fleet;
pub mod ledger;
pub mod policy;
pub mod scheduler;
pub mod service;
pub mod snapshot;
pub mod source;
pub mod zones;

pub use fleet::{DroneRecord, FleetTable, StatusOutcome};
pub use ledger::{Assignment, AssignmentLedger, DropOutcome, FireLedger, ParkedQueue, Stage};
pub use policy::{is_eligible, select_drone, StallPolicy};
pub use scheduler::{Lifecycle, Outbound, Scheduler, SchedulerSettings};
pub use service::SchedulerService;
pub use snapshot::{DroneView, FleetSnapshot, ZoneView};
pub use source::{
    replay, FeedEvent, IncidentSource, SourceReport, CLOSE_ATTEMPTS, DEFAULT_RETRY_INTERVAL,
};
pub use zones::{Registration, ZoneRegistry};
