//! Wires the scheduler, the incident source and the drones onto one
//! transport flavour and runs them to completion.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use emberwatch_core::{DroneId, EmberwatchConfig, TransportKind};
use emberwatch_drone::{DroneInfo, DroneParams, DroneUnit};
use emberwatch_scheduler::{
    replay, FeedEvent, FleetSnapshot, IncidentSource, Scheduler, SchedulerService,
    DEFAULT_RETRY_INTERVAL,
};
use emberwatch_transport::{
    LocalNetwork, Mailbox, Transport, TransportResult, UdpTransport,
};

/// Outcome of a complete run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub incidents_reported: u32,
    pub fires_extinguished: u32,
    pub drones_stopped: usize,
    pub drones_faulted: usize,
}

struct Endpoints<T> {
    scheduler: T,
    source: T,
    drones: Vec<(DroneId, T)>,
}

pub async fn run(config: &EmberwatchConfig) -> anyhow::Result<RunSummary> {
    let network = &config.network;
    match network.transport {
        TransportKind::Local => {
            let local = if network.loss_probability > 0.0 {
                LocalNetwork::with_loss(network.loss_probability, network.loss_seed)
            } else {
                LocalNetwork::new()
            };
            let mut drones = Vec::new();
            for id in 1..=config.drone.count {
                drones.push((id, local.bind(network.drone_endpoint(id))?));
            }
            let endpoints = Endpoints {
                scheduler: local.bind(network.scheduler_addr)?,
                source: local.bind(network.incident_source_addr)?,
                drones,
            };
            launch(config, endpoints).await
        }
        TransportKind::Udp => {
            let mut drones = Vec::new();
            for id in 1..=config.drone.count {
                let addr = network.drone_endpoint(id);
                let transport = UdpTransport::bind(addr)
                    .await
                    .with_context(|| format!("binding drone {id} on {addr}"))?;
                drones.push((id, transport));
            }
            let endpoints = Endpoints {
                scheduler: UdpTransport::bind(network.scheduler_addr)
                    .await
                    .context("binding scheduler socket")?,
                source: UdpTransport::bind(network.incident_source_addr)
                    .await
                    .context("binding incident source socket")?,
                drones,
            };
            launch(config, endpoints).await
        }
    }
}

async fn launch<T: Transport>(
    config: &EmberwatchConfig,
    endpoints: Endpoints<T>,
) -> anyhow::Result<RunSummary> {
    let scheduler_addr = config.network.scheduler_addr;
    let params = DroneParams::from(&config.drone);
    let time_scale = config.simulation.time_scale;

    let drones: Vec<(DroneId, JoinHandle<TransportResult<DroneInfo>>)> = endpoints
        .drones
        .into_iter()
        .map(|(id, transport)| {
            let unit = DroneUnit::new(id, params, transport, scheduler_addr, time_scale);
            (id, tokio::spawn(unit.run()))
        })
        .collect();

    let service = SchedulerService::new(Scheduler::from_config(config), endpoints.scheduler);
    tokio::spawn(watch_fleet(service.subscribe()));
    let scheduler = tokio::spawn(service.run());

    let feed = Arc::new(Mailbox::new());
    tokio::spawn(replay(
        Arc::clone(&feed),
        FeedEvent::from_config(config),
        Duration::ZERO,
    ));
    let retry_interval =
        Duration::try_from_secs_f64(config.scheduler.retry_interval_s * time_scale)
            .unwrap_or(DEFAULT_RETRY_INTERVAL);
    let source = IncidentSource::new(endpoints.source, scheduler_addr, feed)
        .with_retry_interval(retry_interval);
    let report = tokio::spawn(source.run())
        .await
        .context("incident source task")??;

    scheduler.await.context("scheduler task")??;

    let grace = Duration::try_from_secs_f64(config.scheduler.shutdown_grace_s * time_scale)
        .unwrap_or(Duration::ZERO);
    let mut summary = RunSummary {
        incidents_reported: report.incidents_reported,
        fires_extinguished: report.fires_extinguished,
        ..RunSummary::default()
    };
    for (id, handle) in drones {
        let abort = handle.abort_handle();
        match tokio::time::timeout(grace, handle).await {
            Ok(Ok(Ok(info))) => {
                summary.drones_stopped += 1;
                if info.state.is_terminal() {
                    summary.drones_faulted += 1;
                }
                info!(
                    drone_id = id,
                    state = info.state.phase().as_str(),
                    position = %info.position,
                    flight_time_remaining = info.flight_time_remaining,
                    "Drone final state"
                );
            }
            Ok(Ok(Err(e))) => warn!(drone_id = id, error = %e, "Drone transport failed"),
            Ok(Err(e)) => warn!(drone_id = id, error = %e, "Drone task panicked"),
            Err(_) => {
                warn!(drone_id = id, "Drone missed the shutdown order, aborting");
                abort.abort();
            }
        }
    }
    Ok(summary)
}

/// Stand-in for the dashboard: logs every published snapshot.
async fn watch_fleet(mut snapshots: watch::Receiver<FleetSnapshot>) {
    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        for drone in &snapshot.drones {
            debug!(
                drone_id = drone.id,
                phase = drone.phase.as_str(),
                position = %drone.position,
                water = drone.water_liters,
                zone = ?drone.assigned_zone,
                "Fleet"
            );
        }
        for zone in snapshot.zones.iter().filter(|z| z.outstanding_liters > 0.0) {
            debug!(
                zone_id = zone.id,
                outstanding = zone.outstanding_liters,
                drones = ?zone.assigned_drones,
                "Burning"
            );
        }
    }
}
