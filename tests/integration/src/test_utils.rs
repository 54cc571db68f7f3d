//! Test utilities for end-to-end fleet scenarios
//!
//! Wires a scheduler, an incident source and drones onto one in-process
//! network, lossless unless the scenario asks otherwise. The scheduler's
//! transport is wrapped so every message it sends or receives is recorded in
//! order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use emberwatch_core::{
    DroneId, EmberwatchConfig, Fault, IncidentConfig, Severity, ZoneConfig, ZoneId,
};
use emberwatch_drone::{DroneInfo, DroneParams, DroneUnit};
use emberwatch_scheduler::{
    replay, FeedEvent, FleetSnapshot, IncidentSource, Scheduler, SchedulerService, SourceReport,
    DEFAULT_RETRY_INTERVAL,
};
use emberwatch_transport::{
    Endpoint, Envelope, LocalNetwork, Mailbox, Message, Transport, TransportResult,
};

/// Upper bound on a scenario in simulated time
pub const RUN_LIMIT: Duration = Duration::from_secs(4 * 3600);

/// Install a test-friendly subscriber once; later calls are no-ops
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// One recorded message at the scheduler
#[derive(Debug, Clone, PartialEq)]
pub enum Traffic {
    /// Scheduler sent `message` to `to`
    Sent { to: Endpoint, message: Message },
    /// Scheduler received `message` from `from`
    Received { from: Endpoint, message: Message },
}

/// Shared, ordered, timestamped record of scheduler traffic
#[derive(Debug, Clone, Default)]
pub struct TrafficLog {
    entries: Arc<Mutex<Vec<(Instant, Traffic)>>>,
}

impl TrafficLog {
    fn push(&self, entry: Traffic) {
        self.entries.lock().unwrap().push((Instant::now(), entry));
    }

    /// Every recorded entry, in order
    pub fn entries(&self) -> Vec<Traffic> {
        self.timed().into_iter().map(|(_, entry)| entry).collect()
    }

    /// Every recorded entry with the instant it was recorded
    pub fn timed(&self) -> Vec<(Instant, Traffic)> {
        self.entries.lock().unwrap().clone()
    }

    /// When the first message matching `pred` was sent to `to`
    pub fn first_sent_at(&self, to: Endpoint, pred: impl Fn(&Message) -> bool) -> Option<Instant> {
        self.timed().into_iter().find_map(|(at, entry)| match entry {
            Traffic::Sent { to: dest, message } if dest == to && pred(&message) => Some(at),
            _ => None,
        })
    }

    /// Messages the scheduler sent, with destinations
    pub fn sent(&self) -> Vec<(Endpoint, Message)> {
        self.entries()
            .into_iter()
            .filter_map(|t| match t {
                Traffic::Sent { to, message } => Some((to, message)),
                Traffic::Received { .. } => None,
            })
            .collect()
    }

    /// Messages the scheduler received, with senders
    pub fn received(&self) -> Vec<(Endpoint, Message)> {
        self.entries()
            .into_iter()
            .filter_map(|t| match t {
                Traffic::Received { from, message } => Some((from, message)),
                Traffic::Sent { .. } => None,
            })
            .collect()
    }

    /// Zones of every dispatch sent to `drone`, in order
    pub fn dispatches_to(&self, drone: Endpoint) -> Vec<(ZoneId, Fault)> {
        self.sent()
            .into_iter()
            .filter_map(|(to, message)| match message {
                Message::DispatchOrder { zone_id, fault, .. } if to == drone => {
                    Some((zone_id, fault))
                }
                _ => None,
            })
            .collect()
    }

    /// Zones reported extinguished, in order; repeated notices are skipped
    pub fn extinguished(&self) -> Vec<ZoneId> {
        let mut seen = BTreeSet::new();
        self.sent()
            .into_iter()
            .filter_map(|(_, message)| match message {
                Message::FireExtinguished {
                    zone_id,
                    last_incident,
                } if seen.insert((zone_id, last_incident)) => Some(zone_id),
                _ => None,
            })
            .collect()
    }

    /// Messages received from `sender` of the given kind
    pub fn count_received(&self, sender: Endpoint, kind: &str) -> usize {
        self.received()
            .iter()
            .filter(|(from, message)| *from == sender && message.kind() == kind)
            .count()
    }
}

/// Transport wrapper recording all traffic
pub struct Recorded<T> {
    inner: T,
    log: TrafficLog,
}

impl<T: Transport> Recorded<T> {
    pub fn new(inner: T, log: TrafficLog) -> Self {
        Self { inner, log }
    }
}

impl<T: Transport> Transport for Recorded<T> {
    fn local_endpoint(&self) -> Endpoint {
        self.inner.local_endpoint()
    }

    async fn send(&self, message: &Message, destination: Endpoint) -> TransportResult<()> {
        self.log.push(Traffic::Sent {
            to: destination,
            message: message.clone(),
        });
        self.inner.send(message, destination).await
    }

    async fn recv(&self) -> TransportResult<Envelope> {
        let envelope = self.inner.recv().await?;
        self.log.push(Traffic::Received {
            from: envelope.from,
            message: envelope.message.clone(),
        });
        Ok(envelope)
    }
}

/// Scenario builder
pub struct Scenario {
    config: EmberwatchConfig,
}

impl Scenario {
    /// Empty scenario with `drones` drones and default settings
    pub fn new(drones: u32) -> Self {
        let mut config = EmberwatchConfig::default_config();
        config.drone.count = drones;
        config.zones.clear();
        config.incidents.clear();
        Self { config }
    }

    /// Zones 1 and 2 of the reference layout
    pub fn two_zones(drones: u32) -> Self {
        Self::new(drones)
            .zone(1, 0.0, 0.0, 0.0, 600.0)
            .zone(2, 0.0, 600.0, 650.0, 1500.0)
    }

    pub fn zone(mut self, id: ZoneId, x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        self.config.zones.push(ZoneConfig { id, x1, y1, x2, y2 });
        self
    }

    pub fn incident(mut self, zone_id: ZoneId, severity: Severity, fault: Fault) -> Self {
        self.config.incidents.push(IncidentConfig {
            zone_id,
            severity,
            fault,
        });
        self
    }

    /// Drop each frame on the network with `probability`, seeded
    pub fn lossy(mut self, probability: f64, seed: u64) -> Self {
        self.config.network.loss_probability = probability;
        self.config.network.loss_seed = seed;
        self
    }

    /// Mutable access for settings the builder does not cover
    pub fn config_mut(&mut self) -> &mut EmberwatchConfig {
        &mut self.config
    }

    /// Bind every worker and start the run; needs a tokio runtime
    pub fn start(self) -> RunningFleet {
        init_test_logging();
        let config = self.config;
        config.validate().unwrap();

        let network =
            LocalNetwork::with_loss(config.network.loss_probability, config.network.loss_seed);
        let traffic = TrafficLog::default();
        let scheduler_addr = config.network.scheduler_addr;
        let params = DroneParams::from(&config.drone);

        let drones = (1..=config.drone.count)
            .map(|id| {
                let transport = network.bind(config.network.drone_endpoint(id)).unwrap();
                let unit = DroneUnit::new(
                    id,
                    params,
                    transport,
                    scheduler_addr,
                    config.simulation.time_scale,
                );
                (id, tokio::spawn(unit.run()))
            })
            .collect();

        let scheduler_transport =
            Recorded::new(network.bind(scheduler_addr).unwrap(), traffic.clone());
        let service = SchedulerService::new(Scheduler::from_config(&config), scheduler_transport);
        let snapshots = service.subscribe();
        let scheduler = tokio::spawn(service.run());

        let feed = Arc::new(Mailbox::new());
        tokio::spawn(replay(
            Arc::clone(&feed),
            FeedEvent::from_config(&config),
            Duration::ZERO,
        ));
        let source_transport = network.bind(config.network.incident_source_addr).unwrap();
        let retry_interval = Duration::try_from_secs_f64(
            config.scheduler.retry_interval_s * config.simulation.time_scale,
        )
        .unwrap_or(DEFAULT_RETRY_INTERVAL);
        let source = IncidentSource::new(source_transport, scheduler_addr, feed)
            .with_retry_interval(retry_interval);
        let source = tokio::spawn(source.run());

        RunningFleet {
            config,
            traffic,
            snapshots,
            scheduler,
            source,
            drones,
        }
    }
}

/// A fleet whose workers are running
pub struct RunningFleet {
    pub config: EmberwatchConfig,
    pub traffic: TrafficLog,
    pub snapshots: watch::Receiver<FleetSnapshot>,
    scheduler: JoinHandle<TransportResult<Scheduler>>,
    source: JoinHandle<TransportResult<SourceReport>>,
    drones: Vec<(DroneId, JoinHandle<TransportResult<DroneInfo>>)>,
}

impl RunningFleet {
    /// Endpoint of drone `id`
    pub fn drone_addr(&self, id: DroneId) -> Endpoint {
        self.config.network.drone_endpoint(id)
    }

    /// Wait for every worker to stop
    pub async fn finish(self) -> RunOutcome {
        let outcome = self.settle(RUN_LIMIT).await;
        if let Some(id) = outcome.stragglers.first() {
            panic!("drone {id} never halted");
        }
        outcome
    }

    /// Wait for the source and the scheduler, then give drones one shutdown
    /// grace to halt; drones still running after that are aborted and listed
    /// as stragglers. A shutdown order can be lost on a lossy network.
    pub async fn finish_allowing_stragglers(self) -> RunOutcome {
        let grace = Duration::try_from_secs_f64(
            self.config.scheduler.shutdown_grace_s * self.config.simulation.time_scale,
        )
        .unwrap();
        self.settle(grace).await
    }

    async fn settle(self, drone_limit: Duration) -> RunOutcome {
        let report = tokio::time::timeout(RUN_LIMIT, self.source)
            .await
            .expect("incident source never closed the feed")
            .unwrap()
            .unwrap();
        let scheduler = tokio::time::timeout(RUN_LIMIT, self.scheduler)
            .await
            .expect("scheduler never finished")
            .unwrap()
            .unwrap();

        let mut drones = BTreeMap::new();
        let mut stragglers = Vec::new();
        for (id, handle) in self.drones {
            let abort = handle.abort_handle();
            match tokio::time::timeout(drone_limit, handle).await {
                Ok(joined) => {
                    drones.insert(id, joined.unwrap().unwrap());
                }
                Err(_) => {
                    abort.abort();
                    stragglers.push(id);
                }
            }
        }

        RunOutcome {
            scheduler,
            report,
            drones,
            stragglers,
            traffic: self.traffic,
        }
    }
}

/// Everything left after a run
pub struct RunOutcome {
    pub scheduler: Scheduler,
    pub report: SourceReport,
    pub drones: BTreeMap<DroneId, DroneInfo>,
    /// Drones aborted after missing every shutdown order
    pub stragglers: Vec<DroneId>,
    pub traffic: TrafficLog,
}
