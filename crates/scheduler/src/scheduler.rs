//! Scheduler core
//!
//! Sans-IO event handler owning the zone registry, the fire and assignment
//! ledgers, the parked queue and the fleet table. Every handler takes the
//! current instant and returns the messages to send; the caller owns the
//! transport and the clock.

use emberwatch_core::{
    time_to_zone, Coordinate, DroneId, EmberwatchConfig, Fault, IncidentId, Severity, ZoneId,
};
use emberwatch_transport::{DronePhase, DroneSnapshot, Endpoint, Envelope, Message};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::fleet::{DroneRecord, FleetTable, StatusOutcome};
use crate::ledger::{Assignment, AssignmentLedger, DropOutcome, FireLedger, ParkedQueue, Stage};
use crate::policy::{is_eligible, select_drone, StallPolicy};
use crate::snapshot::{DroneView, FleetSnapshot, ZoneView};
use crate::zones::ZoneRegistry;

/// A message the scheduler wants delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    /// Destination
    pub to: Endpoint,
    /// Payload
    pub message: Message,
}

/// Where the scheduler is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Accepting incidents
    Running,
    /// Shutdown broadcast sent, waiting for acknowledgements
    Draining {
        /// Give up waiting at this instant
        deadline: Instant,
        /// Repeat the shutdown order to silent drones at this instant
        resend_at: Instant,
    },
    /// Every drone is done or the grace period ran out
    Finished,
}

/// Static scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerSettings {
    /// Where extinguished notifications go until a sender is observed
    pub incident_source: Endpoint,
    /// Stall deadlines
    pub stall: StallPolicy,
    /// Drone tank size (liters)
    pub water_capacity_l: f64,
    /// Drone flight budget (seconds)
    pub flight_time_capacity_s: f64,
    /// Maximum wait for shutdown acknowledgements
    pub shutdown_grace: Duration,
}

impl SchedulerSettings {
    /// Derive settings from a validated run file
    pub fn from_config(config: &EmberwatchConfig) -> Self {
        let time_scale = config.simulation.time_scale;
        Self {
            incident_source: config.network.incident_source_addr,
            stall: StallPolicy::new(
                &config.scheduler,
                config.drone.drop_seconds_per_liter,
                time_scale,
            ),
            water_capacity_l: config.drone.water_capacity_l,
            flight_time_capacity_s: config.drone.flight_time_capacity_s,
            shutdown_grace: Duration::try_from_secs_f64(
                config.scheduler.shutdown_grace_s * time_scale,
            )
            .unwrap_or(Duration::ZERO),
        }
    }
}

/// The fleet scheduler.
#[derive(Debug, Clone)]
pub struct Scheduler {
    zones: ZoneRegistry,
    fires: FireLedger,
    assignments: AssignmentLedger,
    parked: ParkedQueue,
    fleet: FleetTable,
    stall: StallPolicy,
    incident_source: Endpoint,
    shutdown_grace: Duration,
    lifecycle: Lifecycle,
    extinguished: u32,
}

impl Scheduler {
    /// Create a scheduler with no zones and no drones
    pub fn new(settings: SchedulerSettings) -> Self {
        Self {
            zones: ZoneRegistry::new(),
            fires: FireLedger::new(),
            assignments: AssignmentLedger::new(),
            parked: ParkedQueue::new(),
            fleet: FleetTable::new(settings.water_capacity_l, settings.flight_time_capacity_s),
            stall: settings.stall,
            incident_source: settings.incident_source,
            shutdown_grace: settings.shutdown_grace,
            lifecycle: Lifecycle::Running,
            extinguished: 0,
        }
    }

    /// Create a scheduler that already knows the configured fleet
    pub fn from_config(config: &EmberwatchConfig) -> Self {
        let mut scheduler = Self::new(SchedulerSettings::from_config(config));
        for drone_id in 1..=config.drone.count {
            scheduler.register_drone(drone_id, config.network.drone_endpoint(drone_id));
        }
        scheduler
    }

    /// Add a drone, idle at base, addressed at `endpoint`
    pub fn register_drone(&mut self, drone_id: DroneId, endpoint: Endpoint) {
        self.fleet.register(drone_id, endpoint);
    }

    /// Handle one inbound message.
    pub fn handle(&mut self, envelope: Envelope, now: Instant) -> Vec<Outbound> {
        let Envelope { from, message } = envelope;
        let mut out = Vec::new();
        debug!(kind = message.kind(), %from, "Scheduler received message");

        match self.lifecycle {
            Lifecycle::Finished => {
                debug!(kind = message.kind(), "Scheduler finished, message dropped");
                return out;
            }
            Lifecycle::Draining { .. } => {
                match message {
                    Message::DroneStatusUpdate { snapshot } => {
                        self.on_status(snapshot, now, &mut out)
                    }
                    Message::NoMoreIncidents => {
                        debug!(%from, "End of incidents repeated, acknowledging again");
                        out.push(Outbound {
                            to: from,
                            message: Message::ShutdownOrder,
                        });
                    }
                    Message::IncidentReport { zone_id, .. } => {
                        warn!(zone_id, "Incident refused, scheduler is shutting down")
                    }
                    other => debug!(kind = other.kind(), "Ignored while draining"),
                }
                return out;
            }
            Lifecycle::Running => {}
        }

        match message {
            Message::ZoneRegistration { zone } => {
                self.incident_source = from;
                self.zones.register(zone.id, zone.bounds);
            }
            Message::IncidentReport {
                incident_id,
                zone_id,
                severity,
                fault,
            } => {
                self.incident_source = from;
                self.on_incident(incident_id, zone_id, severity, fault, now, &mut out);
            }
            Message::ArrivedNotice { drone_id, zone_id } => {
                self.on_arrival(drone_id, zone_id, now, &mut out)
            }
            Message::DropConfirmation {
                drone_id,
                volume_liters,
            } => self.on_drop_confirmed(drone_id, volume_liters, now, &mut out),
            Message::DroneStatusUpdate { snapshot } => self.on_status(snapshot, now, &mut out),
            Message::NoMoreIncidents => self.begin_shutdown(from, now, &mut out),
            other => warn!(
                kind = other.kind(),
                %from,
                "Message not meant for the scheduler, discarded"
            ),
        }
        out
    }

    /// Time out stalled assignments, repeat unanswered probes and run the
    /// shutdown drain.
    pub fn expire(&mut self, now: Instant) -> Vec<Outbound> {
        let mut out = Vec::new();
        match self.lifecycle {
            Lifecycle::Running => {}
            Lifecycle::Draining { deadline, resend_at } => {
                if now >= deadline {
                    let pending: Vec<DroneId> = self
                        .fleet
                        .iter()
                        .filter(|d| !d.is_done())
                        .map(|d| d.id)
                        .collect();
                    warn!(?pending, "Shutdown grace elapsed without every acknowledgement");
                    self.lifecycle = Lifecycle::Finished;
                } else if now >= resend_at {
                    self.resend_shutdown(&mut out);
                    self.lifecycle = Lifecycle::Draining {
                        deadline,
                        resend_at: self.stall.retry_deadline(now),
                    };
                }
                return out;
            }
            Lifecycle::Finished => return out,
        }

        for drone_id in self.assignments.stalled(now) {
            let Some(assignment) = self.assignments.clear(drone_id) else {
                continue;
            };
            let zone_id = assignment.zone_id;
            warn!(
                drone_id,
                zone_id,
                stage = ?assignment.stage,
                "Assignment stalled, probing drone and reassigning zone"
            );
            self.fleet.mark_unresponsive(drone_id);
            if let Some(record) = self.fleet.get(drone_id) {
                out.push(Outbound {
                    to: record.endpoint,
                    message: Message::ReassignRequest { drone_id },
                });
            }
            self.fleet.schedule_recheck(drone_id, self.stall.retry_deadline(now));
            if self.fires.outstanding(zone_id).is_some() && !self.assignments.covers(zone_id) {
                self.assign_drone(zone_id, now, &mut out);
            }
        }

        for drone_id in self.fleet.rechecks_due(now) {
            if self.assignments.get(drone_id).is_some() {
                self.fleet.cancel_recheck(drone_id);
                continue;
            }
            let Some(record) = self.fleet.get(drone_id) else {
                continue;
            };
            debug!(drone_id, "No Idle report yet, probing drone again");
            out.push(Outbound {
                to: record.endpoint,
                message: Message::ReassignRequest { drone_id },
            });
            self.fleet.schedule_recheck(drone_id, self.stall.retry_deadline(now));
        }
        out
    }

    /// Next instant `expire` has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.lifecycle {
            Lifecycle::Running => {
                match (self.assignments.next_deadline(), self.fleet.next_recheck()) {
                    (Some(stall), Some(recheck)) => Some(stall.min(recheck)),
                    (stall, recheck) => stall.or(recheck),
                }
            }
            Lifecycle::Draining {
                deadline,
                resend_at,
            } => Some(deadline.min(resend_at)),
            Lifecycle::Finished => None,
        }
    }

    /// Current lifecycle stage
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Whether the run is over
    pub fn is_finished(&self) -> bool {
        self.lifecycle == Lifecycle::Finished
    }

    /// Zone registry
    pub fn zones(&self) -> &ZoneRegistry {
        &self.zones
    }

    /// Fire ledger
    pub fn fires(&self) -> &FireLedger {
        &self.fires
    }

    /// Assignment ledger
    pub fn assignments(&self) -> &AssignmentLedger {
        &self.assignments
    }

    /// Parked zones
    pub fn parked(&self) -> &ParkedQueue {
        &self.parked
    }

    /// Fleet table
    pub fn fleet(&self) -> &FleetTable {
        &self.fleet
    }

    /// Owned view for the dashboard
    pub fn snapshot(&self) -> FleetSnapshot {
        let zones = self
            .zones
            .iter()
            .map(|zone| ZoneView {
                id: zone.id,
                center: zone.center,
                outstanding_liters: self.fires.outstanding(zone.id).unwrap_or(0.0),
                assigned_drones: self.assignments.drones_on(zone.id),
            })
            .collect();
        let drones = self
            .fleet
            .iter()
            .map(|drone| DroneView {
                id: drone.id,
                phase: drone.phase,
                position: drone.position,
                water_liters: drone.shadow_water,
                flight_time_remaining: drone.flight_time_remaining,
                assigned_zone: self.assignments.get(drone.id).map(|a| a.zone_id),
                unresponsive: drone.unresponsive,
            })
            .collect();

        FleetSnapshot {
            zones,
            drones,
            parked: self.parked.iter().collect(),
            shutting_down: self.lifecycle != Lifecycle::Running,
            extinguished: self.extinguished,
        }
    }

    fn on_incident(
        &mut self,
        incident_id: IncidentId,
        zone_id: ZoneId,
        severity: Severity,
        fault: Fault,
        now: Instant,
        out: &mut Vec<Outbound>,
    ) {
        if !self.zones.contains(zone_id) {
            warn!(incident_id, zone_id, %severity, "Incident for unregistered zone ignored");
            return;
        }
        if self.fires.is_applied(incident_id) {
            self.on_repeated_incident(incident_id, zone_id, out);
            return;
        }
        let liters = severity.required_liters();
        if liters <= 0.0 {
            debug!(incident_id, zone_id, "Incident without demand ignored");
            return;
        }

        let Some(outstanding) = self.fires.add(zone_id, incident_id, liters) else {
            return;
        };
        self.fires.arm_fault(zone_id, fault);
        info!(incident_id, zone_id, %severity, outstanding, %fault, "Incident recorded");
        self.assign_drone(zone_id, now, out);
    }

    /// A report the ledger already holds: the source missed the outcome, so
    /// repeat the extinguished notice once the zone is out.
    fn on_repeated_incident(
        &mut self,
        incident_id: IncidentId,
        zone_id: ZoneId,
        out: &mut Vec<Outbound>,
    ) {
        if self.fires.outstanding(zone_id).is_some() {
            debug!(incident_id, zone_id, "Repeated incident for a burning zone ignored");
            return;
        }
        let last_incident = self.fires.latest_incident(zone_id).unwrap_or(incident_id);
        debug!(incident_id, zone_id, last_incident, "Repeating extinguished notice");
        out.push(Outbound {
            to: self.incident_source,
            message: Message::FireExtinguished {
                zone_id,
                last_incident,
            },
        });
    }

    fn on_arrival(
        &mut self,
        drone_id: DroneId,
        zone_id: ZoneId,
        now: Instant,
        out: &mut Vec<Outbound>,
    ) {
        let Some(assignment) = self.assignments.get(drone_id).copied() else {
            warn!(drone_id, zone_id, "Arrival from unassigned drone ignored");
            return;
        };
        if assignment.zone_id != zone_id || assignment.stage != Stage::AwaitingArrival {
            warn!(
                drone_id,
                zone_id,
                assigned_zone = assignment.zone_id,
                "Arrival does not match assignment, ignored"
            );
            return;
        }
        let Some(record) = self.fleet.get(drone_id) else {
            return;
        };
        let endpoint = record.endpoint;

        let volume = match self.fires.outstanding(zone_id) {
            Some(outstanding) => outstanding.min(record.shadow_water),
            None => 0.0,
        };
        if volume <= 0.0 {
            warn!(drone_id, zone_id, "Nothing to drop on arrival, releasing drone");
            self.assignments.clear(drone_id);
            self.fleet.schedule_recheck(drone_id, self.stall.retry_deadline(now));
            out.push(Outbound {
                to: endpoint,
                message: Message::ReassignRequest { drone_id },
            });
            return;
        }

        self.assignments.advance(
            drone_id,
            Stage::AwaitingDrop { volume },
            self.stall.drop_deadline(now, volume),
        );
        self.fleet.note_drop_ordered(drone_id);
        info!(drone_id, zone_id, volume, "Ordering drop");
        out.push(Outbound {
            to: endpoint,
            message: Message::DropOrder {
                volume_liters: volume,
            },
        });
    }

    fn on_drop_confirmed(
        &mut self,
        drone_id: DroneId,
        volume: f64,
        now: Instant,
        out: &mut Vec<Outbound>,
    ) {
        let Some(assignment) = self.assignments.clear(drone_id) else {
            warn!(drone_id, volume, "Drop confirmation from unassigned drone ignored");
            return;
        };
        let zone_id = assignment.zone_id;
        self.fleet.note_drop_confirmed(drone_id, volume);
        self.fleet.schedule_recheck(drone_id, self.stall.retry_deadline(now));

        match self.fires.record_drop(zone_id, volume) {
            DropOutcome::Extinguished => {
                self.parked.remove(zone_id);
                self.extinguished += 1;
                let last_incident = self.fires.latest_incident(zone_id).unwrap_or_default();
                info!(zone_id, drone_id, last_incident, "Fire extinguished");
                out.push(Outbound {
                    to: self.incident_source,
                    message: Message::FireExtinguished {
                        zone_id,
                        last_incident,
                    },
                });
            }
            DropOutcome::Remaining(remaining) => {
                info!(zone_id, drone_id, volume, remaining, "Drop confirmed, fire persists");
                self.assign_drone(zone_id, now, out);
            }
            DropOutcome::Untracked => {
                warn!(zone_id, drone_id, "Drop confirmed for a zone no longer burning");
            }
        }
    }

    fn on_status(&mut self, snapshot: DroneSnapshot, now: Instant, out: &mut Vec<Outbound>) {
        let drone_id = snapshot.drone_id;
        if self.fleet.apply_status(&snapshot) == StatusOutcome::Stale {
            return;
        }

        if let Lifecycle::Draining { .. } = self.lifecycle {
            if self.fleet.get(drone_id).is_some_and(|d| d.shutdown_acked) {
                return;
            }
            self.fleet.ack_shutdown(drone_id);
            info!(drone_id, position = %snapshot.position, "Drone acknowledged shutdown");
            self.check_drained();
            return;
        }

        if snapshot.phase != DronePhase::Idle {
            return;
        }
        if self.assignments.get(drone_id).is_some() {
            debug!(drone_id, "Idle report from assigned drone ignored");
            return;
        }
        self.assign_idle(drone_id, now, out);
    }

    /// Give an idle drone work: uncovered burning zones by ascending id
    /// first, then parked zones oldest first.
    fn assign_idle(&mut self, drone_id: DroneId, now: Instant, out: &mut Vec<Outbound>) {
        let Some(record) = self.fleet.get(drone_id) else {
            return;
        };

        let uncovered = self
            .fires
            .burning()
            .map(|(zone_id, _)| zone_id)
            .filter(|zone_id| !self.assignments.covers(*zone_id));
        let choice = uncovered
            .chain(self.parked.iter())
            .filter_map(|zone_id| self.zones.center(zone_id).map(|c| (zone_id, c)))
            .find(|(_, target)| is_eligible(record, &self.assignments, target));

        match choice {
            Some((zone_id, target)) => self.dispatch(drone_id, zone_id, target, now, out),
            None => debug!(drone_id, "No work for idle drone"),
        }
    }

    /// Dispatch the first feasible drone to `zone_id`, parking the zone when
    /// none qualifies. Returns whether a drone was dispatched.
    fn assign_drone(&mut self, zone_id: ZoneId, now: Instant, out: &mut Vec<Outbound>) -> bool {
        let Some(target) = self.zones.center(zone_id) else {
            return false;
        };
        match select_drone(&self.fleet, &self.assignments, &target) {
            Some(drone_id) => {
                self.dispatch(drone_id, zone_id, target, now, out);
                true
            }
            None => {
                if self.parked.park(zone_id) {
                    info!(zone_id, parked = self.parked.len(), "No feasible drone, zone parked");
                }
                false
            }
        }
    }

    fn dispatch(
        &mut self,
        drone_id: DroneId,
        zone_id: ZoneId,
        target: Coordinate,
        now: Instant,
        out: &mut Vec<Outbound>,
    ) {
        let Some(record) = self.fleet.get(drone_id) else {
            return;
        };
        let endpoint = record.endpoint;
        let travel_time = time_to_zone(&record.position, &target);
        let assignment = Assignment {
            zone_id,
            stage: Stage::AwaitingArrival,
            deadline: self.stall.arrival_deadline(now, travel_time),
        };
        if !self.assignments.assign(drone_id, assignment) {
            warn!(drone_id, zone_id, "Drone already assigned, dispatch skipped");
            return;
        }

        let fault = self.fires.take_fault(zone_id);
        self.fleet.cancel_recheck(drone_id);
        self.fleet.note_dispatch(drone_id, target, travel_time);
        self.parked.remove(zone_id);
        info!(drone_id, zone_id, travel_time, %fault, "Dispatching drone");
        out.push(Outbound {
            to: endpoint,
            message: Message::DispatchOrder {
                zone_id,
                target,
                fault,
            },
        });
    }

    fn begin_shutdown(&mut self, from: Endpoint, now: Instant, out: &mut Vec<Outbound>) {
        if !self.fires.all_clear() {
            warn!("End of incidents signalled while zones still burn");
        }
        self.parked.clear();
        self.fleet.clear_rechecks();
        let assigned: Vec<DroneId> = self.assignments.iter().map(|(id, _)| id).collect();
        for drone_id in assigned {
            self.assignments.clear(drone_id);
        }

        for record in self.fleet.iter() {
            out.push(Outbound {
                to: record.endpoint,
                message: Message::ShutdownOrder,
            });
        }
        info!(drones = self.fleet.len(), "Shutdown broadcast to fleet");
        out.push(Outbound {
            to: from,
            message: Message::ShutdownOrder,
        });
        self.lifecycle = Lifecycle::Draining {
            deadline: now + self.shutdown_grace,
            resend_at: self.stall.retry_deadline(now),
        };
        self.check_drained();
    }

    /// Repeat the shutdown order to every drone that has not answered it
    fn resend_shutdown(&self, out: &mut Vec<Outbound>) {
        let silent: Vec<&DroneRecord> = self.fleet.iter().filter(|d| !d.shutdown_acked).collect();
        if !silent.is_empty() {
            debug!(drones = silent.len(), "Repeating shutdown order");
        }
        out.extend(silent.into_iter().map(|record| Outbound {
            to: record.endpoint,
            message: Message::ShutdownOrder,
        }));
    }

    fn check_drained(&mut self) {
        if matches!(self.lifecycle, Lifecycle::Draining { .. }) && self.fleet.all_done() {
            info!("Every drone accounted for, scheduler finished");
            self.lifecycle = Lifecycle::Finished;
        }
    }
}
