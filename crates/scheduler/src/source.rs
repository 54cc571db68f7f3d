//! Incident source worker
//!
//! Takes zone definitions and incidents from a feed mailbox, forwards them to
//! the scheduler, and tracks extinguished notifications. Once the feed has
//! ended and every fire it reported is out, it signals `NoMoreIncidents`.
//!
//! Nothing sent is assumed delivered: reports for zones still burning are
//! repeated every retry interval, and `NoMoreIncidents` is repeated until the
//! scheduler answers with `ShutdownOrder` or the attempts run out.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use emberwatch_core::{EmberwatchConfig, Fault, IncidentId, Severity, Zone, ZoneId};
use emberwatch_transport::{Endpoint, Envelope, Mailbox, Message, Transport, TransportResult};

/// Pause before unanswered reports are sent again, unless configured
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// `NoMoreIncidents` attempts before the source stops waiting for an answer
pub const CLOSE_ATTEMPTS: u32 = 10;

/// One entry of the incident feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A zone to register
    Zone(Zone),
    /// A fire to report
    Incident {
        /// Burning zone
        zone_id: ZoneId,
        /// Fire intensity
        severity: Severity,
        /// Fault to inject into the first dispatch
        fault: Fault,
    },
    /// Nothing more will be fed
    EndOfFeed,
}

impl FeedEvent {
    /// The run file's zones, then its incidents, then the end marker
    pub fn from_config(config: &EmberwatchConfig) -> Vec<FeedEvent> {
        let zones = config.zones.iter().map(|z| FeedEvent::Zone(z.to_zone()));
        let incidents = config.incidents.iter().map(|i| FeedEvent::Incident {
            zone_id: i.zone_id,
            severity: i.severity,
            fault: i.fault,
        });
        zones
            .chain(incidents)
            .chain(std::iter::once(FeedEvent::EndOfFeed))
            .collect()
    }
}

/// Push `events` into `feed` one at a time, pausing `pace` after each incident.
pub async fn replay(feed: Arc<Mailbox<FeedEvent>>, events: Vec<FeedEvent>, pace: Duration) {
    for event in events {
        let is_incident = matches!(event, FeedEvent::Incident { .. });
        feed.put(event).await;
        if is_incident && !pace.is_zero() {
            tokio::time::sleep(pace).await;
        }
    }
}

/// Totals reported when the source stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceReport {
    /// Zones forwarded
    pub zones_registered: u32,
    /// Incidents forwarded
    pub incidents_reported: u32,
    /// Extinguished notifications for reported fires
    pub fires_extinguished: u32,
    /// Incident reports sent again for zones still burning
    pub reports_repeated: u32,
    /// Scheduler answered `NoMoreIncidents`
    pub close_acknowledged: bool,
}

/// An incident sent to the scheduler and not yet covered by an
/// extinguished notification.
#[derive(Debug, Clone, Copy)]
struct Reported {
    incident_id: IncidentId,
    severity: Severity,
    fault: Fault,
}

impl Reported {
    fn to_message(self, zone_id: ZoneId) -> Message {
        Message::IncidentReport {
            incident_id: self.incident_id,
            zone_id,
            severity: self.severity,
            fault: self.fault,
        }
    }
}

/// Incident source bound to a transport.
pub struct IncidentSource<T> {
    transport: T,
    scheduler: Endpoint,
    feed: Arc<Mailbox<FeedEvent>>,
    zones: BTreeMap<ZoneId, Zone>,
    burning: BTreeMap<ZoneId, Vec<Reported>>,
    next_incident: IncidentId,
    retry_interval: Duration,
    report: SourceReport,
}

impl<T: Transport> IncidentSource<T> {
    /// Create a source reading `feed` and reporting to `scheduler`
    pub fn new(transport: T, scheduler: Endpoint, feed: Arc<Mailbox<FeedEvent>>) -> Self {
        Self {
            transport,
            scheduler,
            feed,
            zones: BTreeMap::new(),
            burning: BTreeMap::new(),
            next_incident: 1,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            report: SourceReport::default(),
        }
    }

    /// Repeat unanswered messages after `interval`
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Run until `NoMoreIncidents` is acknowledged or abandoned.
    pub async fn run(mut self) -> TransportResult<SourceReport> {
        info!(
            endpoint = %self.transport.local_endpoint(),
            retry_interval = ?self.retry_interval,
            "Incident source online"
        );
        let mut feed_open = true;
        let mut retry_at = Instant::now() + self.retry_interval;

        while feed_open || !self.burning.is_empty() {
            tokio::select! {
                event = self.feed.get(), if feed_open => {
                    feed_open = self.forward(event).await;
                }
                received = self.transport.recv() => {
                    let envelope = received?;
                    self.on_message(envelope);
                }
                _ = tokio::time::sleep_until(retry_at) => {
                    self.repeat_burning().await;
                    retry_at = Instant::now() + self.retry_interval;
                }
            }
        }

        self.report.close_acknowledged = self.close().await?;
        info!(
            zones = self.report.zones_registered,
            incidents = self.report.incidents_reported,
            extinguished = self.report.fires_extinguished,
            repeated = self.report.reports_repeated,
            "Every reported fire is out, incident feed closed"
        );
        Ok(self.report)
    }

    /// Forward one feed event; returns false at the end of the feed.
    async fn forward(&mut self, event: FeedEvent) -> bool {
        match event {
            FeedEvent::Zone(zone) => {
                self.zones.insert(zone.id, zone);
                self.report.zones_registered += 1;
                self.send(&Message::ZoneRegistration { zone }).await;
            }
            FeedEvent::Incident {
                zone_id,
                severity,
                fault,
            } => {
                if !self.zones.contains_key(&zone_id) {
                    warn!(zone_id, %severity, "Incident for undefined zone skipped");
                    return true;
                }
                let reported = Reported {
                    incident_id: self.next_incident,
                    severity,
                    fault,
                };
                self.next_incident += 1;
                if severity.required_liters() > 0.0 {
                    self.burning.entry(zone_id).or_default().push(reported);
                }
                self.report.incidents_reported += 1;
                info!(
                    incident_id = reported.incident_id,
                    zone_id,
                    %severity,
                    %fault,
                    "Reporting incident"
                );
                self.send(&reported.to_message(zone_id)).await;
            }
            FeedEvent::EndOfFeed => {
                info!(burning = self.burning.len(), "Incident feed exhausted");
                return false;
            }
        }
        true
    }

    fn on_message(&mut self, envelope: Envelope) {
        match envelope.message {
            Message::FireExtinguished {
                zone_id,
                last_incident,
            } => self.on_extinguished(zone_id, last_incident),
            other => debug!(
                kind = other.kind(),
                from = %envelope.from,
                "Incident source ignoring message"
            ),
        }
    }

    fn on_extinguished(&mut self, zone_id: ZoneId, last_incident: IncidentId) {
        let Some(reported) = self.burning.get(&zone_id) else {
            debug!(zone_id, last_incident, "Extinguished notification for a zone not burning");
            return;
        };
        if reported.iter().any(|r| r.incident_id > last_incident) {
            debug!(
                zone_id,
                last_incident,
                "Zone went out before its newest incident arrived, still burning"
            );
            return;
        }

        self.burning.remove(&zone_id);
        self.report.fires_extinguished += 1;
        info!(zone_id, remaining = self.burning.len(), "Fire reported out");
    }

    /// Send the zone and every incident again for each zone still burning
    async fn repeat_burning(&mut self) {
        let mut messages = Vec::new();
        for (zone_id, reported) in &self.burning {
            if let Some(zone) = self.zones.get(zone_id) {
                messages.push(Message::ZoneRegistration { zone: *zone });
            }
            messages.extend(reported.iter().map(|r| r.to_message(*zone_id)));
        }
        if messages.is_empty() {
            return;
        }

        let repeated = messages
            .iter()
            .filter(|m| matches!(m, Message::IncidentReport { .. }))
            .count();
        debug!(zones = self.burning.len(), repeated, "Repeating reports for zones still burning");
        for message in &messages {
            self.send(message).await;
        }
        self.report.reports_repeated += u32::try_from(repeated).unwrap_or(u32::MAX);
    }

    /// Signal the end of incidents until the scheduler answers.
    ///
    /// Returns whether an answer arrived within `CLOSE_ATTEMPTS` tries.
    async fn close(&mut self) -> TransportResult<bool> {
        for attempt in 1..=CLOSE_ATTEMPTS {
            self.send(&Message::NoMoreIncidents).await;
            let deadline = Instant::now() + self.retry_interval;
            while let Ok(received) = tokio::time::timeout_at(deadline, self.transport.recv()).await {
                let envelope = received?;
                match envelope.message {
                    Message::ShutdownOrder => {
                        debug!(attempt, "Scheduler acknowledged end of incidents");
                        return Ok(true);
                    }
                    other => debug!(kind = other.kind(), "Late message while closing ignored"),
                }
            }
            debug!(attempt, "End of incidents not acknowledged yet");
        }
        warn!(
            attempts = CLOSE_ATTEMPTS,
            "Scheduler never acknowledged end of incidents, closing anyway"
        );
        Ok(false)
    }

    async fn send(&self, message: &Message) {
        if let Err(e) = self.transport.send(message, self.scheduler).await {
            warn!(kind = message.kind(), error = %e, "Failed to reach scheduler");
        }
    }
}
