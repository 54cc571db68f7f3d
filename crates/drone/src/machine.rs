//! Drone state machine
//!
//! `transition` is a pure function from the current drone data and one event
//! to the next drone data plus the effects the worker must carry out. Every
//! transition emits at most one outbound message.
//!
//! | State         | Dispatch        | Drop            | Reassign          | Travel done     | Drop done   | Refill done |
//! |---------------|-----------------|-----------------|-------------------|-----------------|-------------|-------------|
//! | Idle          | -> OnRoute      | ignored         | re-announce       |                 |             |             |
//! | OnRoute       | redirect        | -> Dropping     | abandon -> Idle   | ArrivedNotice   |             |             |
//! | DroppingAgent | ignored         | ignored         | ignored           |                 | -> Refilling|             |
//! | Refilling     | ignored         | ignored         | ignored           |                 |             | -> Idle     |
//! | Faulted       | ignored         | ignored         | ignored           |                 |             |             |
//!
//! Shutdown sends any non-faulted drone home and halts its loop; a faulted
//! drone halts without changing state or reporting.

use emberwatch_core::{time_to_zone, Coordinate, DroneId, Fault, ZoneId};
use emberwatch_transport::Message;

use crate::info::{DroneInfo, DroneParams};
use crate::state::{DroneState, Mission};

/// Something that happened to a drone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DroneEvent {
    /// Scheduler dispatch order
    Dispatch {
        /// Destination zone
        zone_id: ZoneId,
        /// Zone center
        target: Coordinate,
        /// Injected test condition
        fault: Fault,
    },
    /// Scheduler drop order
    Drop {
        /// Requested volume (liters)
        volume_liters: f64,
    },
    /// Scheduler stall probe
    Reassign,
    /// Return to base and stop
    Shutdown,
    /// Travel timer expired
    TravelComplete,
    /// Drop timer expired
    DropComplete,
    /// Refill finished
    RefillComplete,
}

impl DroneEvent {
    /// Map an inbound command for drone `drone_id` to an event.
    ///
    /// Returns `None` for messages a drone never acts on.
    pub fn from_message(message: &Message, drone_id: DroneId) -> Option<Self> {
        match *message {
            Message::DispatchOrder {
                zone_id,
                target,
                fault,
            } => Some(DroneEvent::Dispatch {
                zone_id,
                target,
                fault,
            }),
            Message::DropOrder { volume_liters } => Some(DroneEvent::Drop { volume_liters }),
            Message::ReassignRequest { drone_id: probed } if probed == drone_id => {
                Some(DroneEvent::Reassign)
            }
            Message::ShutdownOrder => Some(DroneEvent::Shutdown),
            _ => None,
        }
    }

    /// Short name, for logging
    pub fn name(&self) -> &'static str {
        match self {
            DroneEvent::Dispatch { .. } => "dispatch",
            DroneEvent::Drop { .. } => "drop",
            DroneEvent::Reassign => "reassign",
            DroneEvent::Shutdown => "shutdown",
            DroneEvent::TravelComplete => "travel_complete",
            DroneEvent::DropComplete => "drop_complete",
            DroneEvent::RefillComplete => "refill_complete",
        }
    }
}

/// Internal timers; a drone runs at most one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// Fires `TravelComplete`
    Travel,
    /// Fires `DropComplete`
    Drop,
    /// Fires `RefillComplete`
    Refill,
}

impl Timer {
    /// Event raised when the timer expires
    pub fn event(&self) -> DroneEvent {
        match self {
            Timer::Travel => DroneEvent::TravelComplete,
            Timer::Drop => DroneEvent::DropComplete,
            Timer::Refill => DroneEvent::RefillComplete,
        }
    }
}

/// Work the drone worker performs after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a message to the scheduler
    Send(Message),
    /// Message swallowed by an injected PACKET_LOSS fault
    Suppress(Message),
    /// Start (or replace) the pending timer
    StartTimer {
        /// Which timer
        timer: Timer,
        /// Simulated seconds until it fires
        after_s: f64,
    },
    /// Drop the pending timer
    CancelTimer,
    /// Leave the read loop
    Halt,
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Drone data after the event
    pub next: DroneInfo,
    /// Effects to carry out, in order
    pub effects: Vec<Effect>,
    /// False when the event was not legal in the current state
    pub applied: bool,
}

impl Step {
    fn ignored(info: &DroneInfo) -> Self {
        Self {
            next: info.clone(),
            effects: Vec::new(),
            applied: false,
        }
    }

    fn applied(next: DroneInfo, effects: Vec<Effect>) -> Self {
        Self {
            next,
            effects,
            applied: true,
        }
    }
}

/// Apply `event` to `info`.
pub fn transition(info: &DroneInfo, event: &DroneEvent, params: &DroneParams) -> Step {
    match (&info.state, *event) {
        (DroneState::Faulted { .. }, DroneEvent::Shutdown) => {
            Step::applied(info.clone(), vec![Effect::Halt])
        }
        (DroneState::Faulted { .. }, _) => Step::ignored(info),

        (_, DroneEvent::Shutdown) => shut_down(info),

        (
            DroneState::Idle | DroneState::OnRoute { .. },
            DroneEvent::Dispatch {
                zone_id,
                target,
                fault,
            },
        ) => begin_travel(
            info,
            Mission {
                zone_id,
                target,
                fault,
            },
        ),

        (DroneState::Idle, DroneEvent::Reassign) => {
            let mut next = info.clone();
            let report = status_report(&mut next);
            Step::applied(next, vec![report])
        }

        (DroneState::OnRoute { mission, .. }, DroneEvent::Drop { volume_liters }) => {
            let mut next = info.clone();
            next.position = mission.target;
            next.state = DroneState::DroppingAgent {
                mission: *mission,
                volume_liters,
            };
            let effects = vec![Effect::StartTimer {
                timer: Timer::Drop,
                after_s: (volume_liters * params.drop_seconds_per_liter).max(0.0),
            }];
            Step::applied(next, effects)
        }

        (
            DroneState::OnRoute {
                mission,
                arrived: false,
            },
            DroneEvent::TravelComplete,
        ) => {
            let mut next = info.clone();
            next.position = mission.target;
            next.state = DroneState::OnRoute {
                mission: *mission,
                arrived: true,
            };
            let notice = emit(
                &mut next,
                Message::ArrivedNotice {
                    drone_id: info.id,
                    zone_id: mission.zone_id,
                },
            );
            Step::applied(next, vec![notice])
        }

        (DroneState::OnRoute { .. }, DroneEvent::Reassign) => {
            let mut next = info.clone();
            next.state = DroneState::Idle;
            let report = status_report(&mut next);
            Step::applied(next, vec![Effect::CancelTimer, report])
        }

        (
            DroneState::DroppingAgent {
                mission,
                volume_liters,
            },
            DroneEvent::DropComplete,
        ) => {
            let mut next = info.clone();
            if mission.fault == Fault::NozzleJammed {
                next.state = DroneState::Faulted {
                    fault: Fault::NozzleJammed,
                };
                return Step::applied(next, Vec::new());
            }

            let released = volume_liters.min(info.water_level).max(0.0);
            next.water_level -= released;
            next.state = DroneState::Refilling;
            let confirmation = emit(
                &mut next,
                Message::DropConfirmation {
                    drone_id: info.id,
                    volume_liters: released,
                },
            );
            Step::applied(
                next,
                vec![
                    confirmation,
                    Effect::StartTimer {
                        timer: Timer::Refill,
                        after_s: 0.0,
                    },
                ],
            )
        }

        (DroneState::Refilling, DroneEvent::RefillComplete) => {
            let mut next = info.clone();
            next.water_level = params.water_capacity_l;
            next.state = DroneState::Idle;
            let report = status_report(&mut next);
            Step::applied(next, vec![report])
        }

        _ => Step::ignored(info),
    }
}

fn begin_travel(info: &DroneInfo, mission: Mission) -> Step {
    let mut next = info.clone();
    let travel_time = time_to_zone(&info.position, &mission.target);
    next.consume_flight_time(travel_time);

    if mission.fault == Fault::PacketLoss {
        next.packet_loss_armed = true;
    }

    if mission.fault == Fault::DroneStuckInFlight {
        next.state = DroneState::Faulted {
            fault: Fault::DroneStuckInFlight,
        };
        return Step::applied(next, vec![Effect::CancelTimer]);
    }

    next.state = DroneState::OnRoute {
        mission,
        arrived: false,
    };
    Step::applied(
        next,
        vec![Effect::StartTimer {
            timer: Timer::Travel,
            after_s: travel_time,
        }],
    )
}

fn shut_down(info: &DroneInfo) -> Step {
    let mut next = info.clone();
    if next.position != Coordinate::BASE {
        next.consume_flight_time(time_to_zone(&next.position, &Coordinate::BASE));
        next.position = Coordinate::BASE;
    }
    next.state = DroneState::Idle;
    let report = status_report(&mut next);
    Step::applied(next, vec![Effect::CancelTimer, report, Effect::Halt])
}

fn status_report(next: &mut DroneInfo) -> Effect {
    let snapshot = next.next_snapshot();
    emit(next, Message::DroneStatusUpdate { snapshot })
}

fn emit(next: &mut DroneInfo, message: Message) -> Effect {
    if next.packet_loss_armed {
        next.packet_loss_armed = false;
        Effect::Suppress(message)
    } else {
        Effect::Send(message)
    }
}
