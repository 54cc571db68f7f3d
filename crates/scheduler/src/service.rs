//! Scheduler worker
//!
//! Single-threaded event loop around `Scheduler`: one inbound message or one
//! expired deadline at a time, outbound messages sent fire-and-forget, and a
//! fresh `FleetSnapshot` published after every event.

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use emberwatch_transport::{Transport, TransportResult};

use crate::scheduler::{Outbound, Scheduler};
use crate::snapshot::FleetSnapshot;

/// Scheduler bound to a transport.
pub struct SchedulerService<T> {
    scheduler: Scheduler,
    transport: T,
    snapshots: watch::Sender<FleetSnapshot>,
}

impl<T: Transport> SchedulerService<T> {
    /// Wrap a scheduler
    pub fn new(scheduler: Scheduler, transport: T) -> Self {
        let (snapshots, _) = watch::channel(scheduler.snapshot());
        Self {
            scheduler,
            transport,
            snapshots,
        }
    }

    /// Receiver of the snapshot published after every event
    pub fn subscribe(&self) -> watch::Receiver<FleetSnapshot> {
        self.snapshots.subscribe()
    }

    /// Run until the shutdown drain completes; returns the final scheduler.
    pub async fn run(mut self) -> TransportResult<Scheduler> {
        info!(
            endpoint = %self.transport.local_endpoint(),
            drones = self.scheduler.fleet().len(),
            "Scheduler online"
        );

        while !self.scheduler.is_finished() {
            let deadline = self.scheduler.next_deadline();
            let outbound = tokio::select! {
                received = self.transport.recv() => {
                    let envelope = received?;
                    self.scheduler.handle(envelope, Instant::now())
                }
                _ = wait_until(deadline) => self.scheduler.expire(Instant::now()),
            };

            self.deliver(outbound).await;
            self.snapshots.send_replace(self.scheduler.snapshot());
        }

        info!(
            extinguished = self.scheduler.snapshot().extinguished,
            "Scheduler stopped"
        );
        Ok(self.scheduler)
    }

    async fn deliver(&self, outbound: Vec<Outbound>) {
        for Outbound { to, message } in outbound {
            if let Err(e) = self.transport.send(&message, to).await {
                warn!(kind = message.kind(), %to, error = %e, "Send failed");
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
