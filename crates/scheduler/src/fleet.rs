//! Fleet table
//!
//! The scheduler's message-derived view of every drone. Nothing here is read
//! from the drones directly: positions, flight budgets and water levels are
//! shadow estimates corrected by each newer status report.

use emberwatch_core::{Coordinate, DroneId};
use emberwatch_transport::{DronePhase, DroneSnapshot, Endpoint};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::time::Instant;
use tracing::{debug, info};

/// Scheduler-side record of one drone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroneRecord {
    /// Drone identifier
    pub id: DroneId,
    /// Where commands for this drone go
    pub endpoint: Endpoint,
    /// Last known or expected phase
    pub phase: DronePhase,
    /// Last known or expected position
    pub position: Coordinate,
    /// Estimated flight budget left (seconds)
    pub flight_time_remaining: f64,
    /// Estimated water on board (liters)
    pub shadow_water: f64,
    /// Highest status sequence number applied
    pub last_seq: u64,
    /// Stalled on an assignment and not heard from since
    pub unresponsive: bool,
    /// Reported after the shutdown broadcast
    pub shutdown_acked: bool,
}

impl DroneRecord {
    /// Whether the drone can take a new assignment
    pub fn is_available(&self) -> bool {
        self.phase == DronePhase::Idle && !self.unresponsive
    }

    /// Whether the drone no longer blocks shutdown
    pub fn is_done(&self) -> bool {
        self.shutdown_acked || self.unresponsive
    }
}

/// Result of applying a status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    /// Report was newer and has been applied
    Applied,
    /// First report from a drone not configured up front
    Registered,
    /// Report was not newer than one already applied
    Stale,
}

/// Every drone the scheduler knows, ascending by id.
///
/// Drones expected to report Idle carry a recheck instant; the scheduler
/// probes them again whenever it passes without that report.
#[derive(Debug, Clone)]
pub struct FleetTable {
    drones: BTreeMap<DroneId, DroneRecord>,
    rechecks: BTreeMap<DroneId, Instant>,
    water_capacity_l: f64,
    flight_time_capacity_s: f64,
}

impl FleetTable {
    /// Create an empty table for drones of the given capacities
    pub fn new(water_capacity_l: f64, flight_time_capacity_s: f64) -> Self {
        Self {
            drones: BTreeMap::new(),
            rechecks: BTreeMap::new(),
            water_capacity_l,
            flight_time_capacity_s,
        }
    }

    /// Register a drone idle at base with full tank and battery
    pub fn register(&mut self, id: DroneId, endpoint: Endpoint) {
        let record = DroneRecord {
            id,
            endpoint,
            phase: DronePhase::Idle,
            position: Coordinate::BASE,
            flight_time_remaining: self.flight_time_capacity_s,
            shadow_water: self.water_capacity_l,
            last_seq: 0,
            unresponsive: false,
            shutdown_acked: false,
        };
        self.drones.insert(id, record);
    }

    /// Apply a status report unless an equal or newer one was applied already
    pub fn apply_status(&mut self, snapshot: &DroneSnapshot) -> StatusOutcome {
        let outcome = if self.drones.contains_key(&snapshot.drone_id) {
            StatusOutcome::Applied
        } else {
            info!(
                drone_id = snapshot.drone_id,
                endpoint = %snapshot.endpoint,
                "Drone discovered from status report"
            );
            self.register(snapshot.drone_id, snapshot.endpoint);
            StatusOutcome::Registered
        };

        let capacity = self.water_capacity_l;
        let Some(record) = self.drones.get_mut(&snapshot.drone_id) else {
            return StatusOutcome::Stale;
        };
        if snapshot.seq <= record.last_seq {
            debug!(
                drone_id = snapshot.drone_id,
                seq = snapshot.seq,
                last_seq = record.last_seq,
                "Stale status report ignored"
            );
            return StatusOutcome::Stale;
        }

        record.last_seq = snapshot.seq;
        record.endpoint = snapshot.endpoint;
        record.phase = snapshot.phase;
        record.position = snapshot.position;
        record.flight_time_remaining = snapshot.flight_time_remaining;
        if snapshot.phase == DronePhase::Idle {
            record.shadow_water = capacity;
            record.unresponsive = false;
            self.rechecks.remove(&snapshot.drone_id);
        }
        outcome
    }

    /// Expect the drone to be flying to `target`
    pub fn note_dispatch(&mut self, id: DroneId, target: Coordinate, travel_time: f64) {
        if let Some(record) = self.drones.get_mut(&id) {
            record.phase = DronePhase::OnRoute;
            record.position = target;
            record.flight_time_remaining = (record.flight_time_remaining - travel_time).max(0.0);
        }
    }

    /// Expect the drone to be dropping
    pub fn note_drop_ordered(&mut self, id: DroneId) {
        if let Some(record) = self.drones.get_mut(&id) {
            record.phase = DronePhase::DroppingAgent;
        }
    }

    /// Charge a confirmed drop against the shadow water level
    pub fn note_drop_confirmed(&mut self, id: DroneId, volume: f64) {
        if let Some(record) = self.drones.get_mut(&id) {
            record.shadow_water = (record.shadow_water - volume).max(0.0);
            record.phase = DronePhase::Refilling;
        }
    }

    /// Exclude a drone from selection until it reports Idle again
    pub fn mark_unresponsive(&mut self, id: DroneId) {
        if let Some(record) = self.drones.get_mut(&id) {
            record.unresponsive = true;
        }
    }

    /// Expect an Idle report from the drone by `at`
    pub fn schedule_recheck(&mut self, id: DroneId, at: Instant) {
        if self.drones.contains_key(&id) {
            self.rechecks.insert(id, at);
        }
    }

    /// Stop expecting a report from the drone
    pub fn cancel_recheck(&mut self, id: DroneId) {
        self.rechecks.remove(&id);
    }

    /// Drones whose recheck is at or before `now`, ascending
    pub fn rechecks_due(&self, now: Instant) -> Vec<DroneId> {
        self.rechecks
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Earliest pending recheck
    pub fn next_recheck(&self) -> Option<Instant> {
        self.rechecks.values().min().copied()
    }

    /// Drop every pending recheck
    pub fn clear_rechecks(&mut self) {
        self.rechecks.clear();
    }

    /// Record that a drone answered the shutdown broadcast
    pub fn ack_shutdown(&mut self, id: DroneId) {
        if let Some(record) = self.drones.get_mut(&id) {
            record.shutdown_acked = true;
        }
    }

    /// Look up a drone
    pub fn get(&self, id: DroneId) -> Option<&DroneRecord> {
        self.drones.get(&id)
    }

    /// Drones in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &DroneRecord> {
        self.drones.values()
    }

    /// Whether every drone is acknowledged or written off
    pub fn all_done(&self) -> bool {
        self.drones.values().all(DroneRecord::is_done)
    }

    /// Tank size used to reset shadow estimates
    pub fn water_capacity_l(&self) -> f64 {
        self.water_capacity_l
    }

    /// Number of known drones
    pub fn len(&self) -> usize {
        self.drones.len()
    }

    /// Whether no drone is known
    pub fn is_empty(&self) -> bool {
        self.drones.is_empty()
    }
}
