//! Scheduler ledgers
//!
//! - `FireLedger`: outstanding suppression demand per zone
//! - `AssignmentLedger`: which drone works which zone, and until when
//! - `ParkedQueue`: zones that found no feasible drone

use emberwatch_core::{DroneId, Fault, IncidentId, ZoneId};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tokio::time::Instant;

/// Effect of a confirmed drop on a zone's demand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DropOutcome {
    /// Demand remains (liters)
    Remaining(f64),
    /// Demand reached zero; the entry is gone
    Extinguished,
    /// The zone had no entry
    Untracked,
}

/// Outstanding demand per burning zone.
///
/// Incidents are applied at most once by id; the newest id per zone outlives
/// the demand so a repeated report can be answered after the fire is out.
#[derive(Debug, Clone, Default)]
pub struct FireLedger {
    demand: BTreeMap<ZoneId, f64>,
    pending_faults: HashMap<ZoneId, Fault>,
    applied: BTreeSet<IncidentId>,
    latest_incident: BTreeMap<ZoneId, IncidentId>,
}

impl FireLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Add incident `incident_id`'s `liters` of demand to a zone, creating
    /// the entry if needed.
    ///
    /// Returns the zone's new outstanding demand, or `None` when the incident
    /// was applied before.
    pub fn add(&mut self, zone_id: ZoneId, incident_id: IncidentId, liters: f64) -> Option<f64> {
        if !self.applied.insert(incident_id) {
            return None;
        }
        let latest = self.latest_incident.entry(zone_id).or_insert(incident_id);
        *latest = (*latest).max(incident_id);

        let entry = self.demand.entry(zone_id).or_insert(0.0);
        *entry += liters;
        Some(*entry)
    }

    /// Whether an incident was already added
    pub fn is_applied(&self, incident_id: IncidentId) -> bool {
        self.applied.contains(&incident_id)
    }

    /// Highest incident id added for a zone
    pub fn latest_incident(&self, zone_id: ZoneId) -> Option<IncidentId> {
        self.latest_incident.get(&zone_id).copied()
    }

    /// Record a drop of `volume` liters
    pub fn record_drop(&mut self, zone_id: ZoneId, volume: f64) -> DropOutcome {
        let Some(remaining) = self.demand.get_mut(&zone_id) else {
            return DropOutcome::Untracked;
        };
        *remaining -= volume;
        if *remaining <= 0.0 {
            self.demand.remove(&zone_id);
            self.pending_faults.remove(&zone_id);
            DropOutcome::Extinguished
        } else {
            DropOutcome::Remaining(*remaining)
        }
    }

    /// Outstanding demand of a zone
    pub fn outstanding(&self, zone_id: ZoneId) -> Option<f64> {
        self.demand.get(&zone_id).copied()
    }

    /// Burning zones with their demand, ascending by zone id
    pub fn burning(&self) -> impl Iterator<Item = (ZoneId, f64)> + '_ {
        self.demand.iter().map(|(zone, liters)| (*zone, *liters))
    }

    /// Whether no zone has outstanding demand
    pub fn all_clear(&self) -> bool {
        self.demand.is_empty()
    }

    /// Arm a fault for the next dispatch to `zone_id`
    pub fn arm_fault(&mut self, zone_id: ZoneId, fault: Fault) {
        if fault != Fault::None {
            self.pending_faults.insert(zone_id, fault);
        }
    }

    /// Take the armed fault for `zone_id`, leaving `Fault::None` behind
    pub fn take_fault(&mut self, zone_id: ZoneId) -> Fault {
        self.pending_faults.remove(&zone_id).unwrap_or_default()
    }
}

/// What an assigned drone is expected to do next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stage {
    /// Dispatched, waiting for `ArrivedNotice`
    AwaitingArrival,
    /// Drop ordered, waiting for `DropConfirmation`
    AwaitingDrop {
        /// Volume ordered (liters)
        volume: f64,
    },
}

/// A drone's current work order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    /// Zone being worked
    pub zone_id: ZoneId,
    /// Expected next report
    pub stage: Stage,
    /// When the assignment counts as stalled
    pub deadline: Instant,
}

/// Drone to zone assignments; at most one per drone.
#[derive(Debug, Clone, Default)]
pub struct AssignmentLedger {
    by_drone: BTreeMap<DroneId, Assignment>,
}

impl AssignmentLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a drone; returns false and changes nothing if it already has one
    pub fn assign(&mut self, drone_id: DroneId, assignment: Assignment) -> bool {
        if self.by_drone.contains_key(&drone_id) {
            return false;
        }
        self.by_drone.insert(drone_id, assignment);
        true
    }

    /// Current assignment of a drone
    pub fn get(&self, drone_id: DroneId) -> Option<&Assignment> {
        self.by_drone.get(&drone_id)
    }

    /// Move an assignment to its next stage
    pub fn advance(&mut self, drone_id: DroneId, stage: Stage, deadline: Instant) {
        if let Some(assignment) = self.by_drone.get_mut(&drone_id) {
            assignment.stage = stage;
            assignment.deadline = deadline;
        }
    }

    /// Remove and return a drone's assignment
    pub fn clear(&mut self, drone_id: DroneId) -> Option<Assignment> {
        self.by_drone.remove(&drone_id)
    }

    /// Whether any drone is working `zone_id`
    pub fn covers(&self, zone_id: ZoneId) -> bool {
        self.by_drone.values().any(|a| a.zone_id == zone_id)
    }

    /// Drones working `zone_id`, ascending
    pub fn drones_on(&self, zone_id: ZoneId) -> Vec<DroneId> {
        self.by_drone
            .iter()
            .filter(|(_, a)| a.zone_id == zone_id)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Earliest stall deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.by_drone.values().map(|a| a.deadline).min()
    }

    /// Drones whose deadline is at or before `now`, ascending
    pub fn stalled(&self, now: Instant) -> Vec<DroneId> {
        self.by_drone
            .iter()
            .filter(|(_, a)| a.deadline <= now)
            .map(|(id, _)| *id)
            .collect()
    }

    /// All assignments, ascending by drone id
    pub fn iter(&self) -> impl Iterator<Item = (DroneId, &Assignment)> {
        self.by_drone.iter().map(|(id, a)| (*id, a))
    }

    /// Number of assigned drones
    pub fn len(&self) -> usize {
        self.by_drone.len()
    }

    /// Whether no drone is assigned
    pub fn is_empty(&self) -> bool {
        self.by_drone.is_empty()
    }
}

/// FIFO of zones waiting for a drone, without duplicates.
#[derive(Debug, Clone, Default)]
pub struct ParkedQueue {
    zones: VecDeque<ZoneId>,
}

impl ParkedQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a zone; returns false if it was already parked
    pub fn park(&mut self, zone_id: ZoneId) -> bool {
        if self.zones.contains(&zone_id) {
            return false;
        }
        self.zones.push_back(zone_id);
        true
    }

    /// Remove a zone wherever it is in the queue
    pub fn remove(&mut self, zone_id: ZoneId) -> bool {
        match self.zones.iter().position(|z| *z == zone_id) {
            Some(index) => {
                self.zones.remove(index);
                true
            }
            None => false,
        }
    }

    /// Parked zones, oldest first
    pub fn iter(&self) -> impl Iterator<Item = ZoneId> + '_ {
        self.zones.iter().copied()
    }

    /// Drop every parked zone
    pub fn clear(&mut self) {
        self.zones.clear();
    }

    /// Number of parked zones
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Whether nothing is parked
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}
