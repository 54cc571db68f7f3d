//! Drone worker
//!
//! Owns one drone's data, reads commands from its transport, races them
//! against the single pending timer, and carries out the effects the state
//! machine returns. Send failures are logged and the loop keeps going.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use emberwatch_transport::{Endpoint, Message, Transport, TransportResult};

use crate::info::{DroneInfo, DroneParams};
use crate::machine::{transition, DroneEvent, Effect, Timer};

/// A running drone bound to a transport.
pub struct DroneUnit<T> {
    info: DroneInfo,
    params: DroneParams,
    transport: T,
    scheduler: Endpoint,
    time_scale: f64,
    timer: Option<(Timer, Instant)>,
}

impl<T: Transport> DroneUnit<T> {
    /// Create a drone idle at base, reporting to `scheduler`.
    ///
    /// `time_scale` converts simulated seconds into wall-clock seconds.
    pub fn new(
        id: emberwatch_core::DroneId,
        params: DroneParams,
        transport: T,
        scheduler: Endpoint,
        time_scale: f64,
    ) -> Self {
        let info = DroneInfo::new(id, transport.local_endpoint(), &params);
        Self {
            info,
            params,
            transport,
            scheduler,
            time_scale,
            timer: None,
        }
    }

    /// Current drone data
    pub fn info(&self) -> &DroneInfo {
        &self.info
    }

    /// Announce the initial state, then process events until shut down.
    ///
    /// Returns the final drone data. Fails only when the transport closes.
    pub async fn run(mut self) -> TransportResult<DroneInfo> {
        info!(
            drone_id = self.info.id,
            endpoint = %self.info.endpoint,
            "Drone online"
        );
        let snapshot = self.info.next_snapshot();
        self.send(&Message::DroneStatusUpdate { snapshot }).await;

        loop {
            let event = tokio::select! {
                received = self.transport.recv() => {
                    let envelope = received?;
                    match DroneEvent::from_message(&envelope.message, self.info.id) {
                        Some(event) => event,
                        None => {
                            debug!(
                                drone_id = self.info.id,
                                kind = envelope.message.kind(),
                                from = %envelope.from,
                                "Ignoring message not addressed to drones"
                            );
                            continue;
                        }
                    }
                }
                timer = expiry(self.timer) => {
                    self.timer = None;
                    timer.event()
                }
            };

            if self.apply(event).await {
                break;
            }
        }

        info!(
            drone_id = self.info.id,
            state = self.info.state.phase().as_str(),
            position = %self.info.position,
            "Drone stopped"
        );
        Ok(self.info)
    }

    /// Apply one event; returns true when the loop must stop.
    async fn apply(&mut self, event: DroneEvent) -> bool {
        let step = transition(&self.info, &event, &self.params);
        if !step.applied {
            warn!(
                drone_id = self.info.id,
                event = event.name(),
                state = self.info.state.phase().as_str(),
                "Event not valid in current state, ignored"
            );
            return false;
        }

        let before = self.info.state.phase();
        self.info = step.next;
        let after = self.info.state.phase();
        if before != after {
            info!(
                drone_id = self.info.id,
                from = before.as_str(),
                to = after.as_str(),
                event = event.name(),
                "Drone state changed"
            );
        }

        let mut halt = false;
        for effect in step.effects {
            match effect {
                Effect::Send(message) => self.send(&message).await,
                Effect::Suppress(message) => warn!(
                    drone_id = self.info.id,
                    kind = message.kind(),
                    "Outbound message lost to injected packet loss"
                ),
                Effect::StartTimer { timer, after_s } => {
                    self.timer = Some((timer, Instant::now() + self.scaled(after_s)));
                }
                Effect::CancelTimer => self.timer = None,
                Effect::Halt => halt = true,
            }
        }
        halt
    }

    async fn send(&self, message: &Message) {
        if let Err(e) = self.transport.send(message, self.scheduler).await {
            warn!(
                drone_id = self.info.id,
                kind = message.kind(),
                error = %e,
                "Failed to reach scheduler"
            );
        }
    }

    fn scaled(&self, simulated_s: f64) -> Duration {
        Duration::try_from_secs_f64(simulated_s * self.time_scale).unwrap_or(Duration::ZERO)
    }
}

async fn expiry(timer: Option<(Timer, Instant)>) -> Timer {
    match timer {
        Some((timer, deadline)) => {
            tokio::time::sleep_until(deadline).await;
            timer
        }
        None => std::future::pending().await,
    }
}
