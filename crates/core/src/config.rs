//! Configuration management for Emberwatch.
//!
//! A run is described by one TOML file: network layout, fleet parameters,
//! scheduler timeouts and the scenario (zones plus incidents) to replay.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::types::{Bounds, DroneId, Fault, Severity, Zone, ZoneId, BASE_ZONE_ID};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmberwatchConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub drone: DroneConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
    #[serde(default)]
    pub incidents: Vec<IncidentConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// In-process channels
    Local,
    /// One UDP socket per worker
    Udp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub scheduler_addr: SocketAddr,
    pub incident_source_addr: SocketAddr,
    pub drone_host: IpAddr,
    /// Drone `n` listens on `drone_base_port + n`
    pub drone_base_port: u16,
    pub transport: TransportKind,
    /// Probability that the in-process network drops a frame
    pub loss_probability: f64,
    pub loss_seed: u64,
}

impl NetworkConfig {
    /// Predictable endpoint of a drone, no discovery step needed
    pub fn drone_endpoint(&self, drone_id: DroneId) -> SocketAddr {
        let port = u32::from(self.drone_base_port).saturating_add(drone_id);
        SocketAddr::new(self.drone_host, port.min(u32::from(u16::MAX)) as u16)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        Self {
            scheduler_addr: SocketAddr::new(localhost, 6000),
            incident_source_addr: SocketAddr::new(localhost, 6001),
            drone_host: localhost,
            drone_base_port: 6100,
            transport: TransportKind::Local,
            loss_probability: 0.0,
            loss_seed: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DroneConfig {
    pub count: u32,
    pub water_capacity_l: f64,
    pub flight_time_capacity_s: f64,
    pub drop_seconds_per_liter: f64,
}

impl Default for DroneConfig {
    fn default() -> Self {
        Self {
            count: 3,
            water_capacity_l: 15.0,
            flight_time_capacity_s: 1800.0,
            drop_seconds_per_liter: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Multiplier on the expected stage duration before a stall is declared
    pub stall_timeout_factor: f64,
    /// Fixed slack added to every stall deadline (seconds)
    pub stall_timeout_grace_s: f64,
    /// Upper bound on waiting for shutdown acknowledgements (seconds)
    pub shutdown_grace_s: f64,
    /// Pause before an unanswered message is sent again (seconds)
    pub retry_interval_s: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stall_timeout_factor: 2.0,
            stall_timeout_grace_s: 5.0,
            shutdown_grace_s: 30.0,
            retry_interval_s: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Wall-clock seconds per simulated second
    pub time_scale: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { time_scale: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub id: ZoneId,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl ZoneConfig {
    pub fn to_zone(&self) -> Zone {
        Zone::new(self.id, Bounds::new(self.x1, self.y1, self.x2, self.y2))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IncidentConfig {
    pub zone_id: ZoneId,
    pub severity: Severity,
    #[serde(default)]
    pub fault: Fault,
}

impl EmberwatchConfig {
    /// Load and validate a run file
    pub fn from_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a run file already in memory
    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Built-in two-zone scenario with default fleet settings
    pub fn default_config() -> Self {
        Self {
            network: NetworkConfig::default(),
            drone: DroneConfig::default(),
            scheduler: SchedulerConfig::default(),
            simulation: SimulationConfig::default(),
            zones: vec![
                ZoneConfig { id: 1, x1: 0.0, y1: 0.0, x2: 0.0, y2: 600.0 },
                ZoneConfig { id: 2, x1: 0.0, y1: 600.0, x2: 650.0, y2: 1500.0 },
            ],
            incidents: vec![
                IncidentConfig { zone_id: 1, severity: Severity::High, fault: Fault::None },
                IncidentConfig { zone_id: 2, severity: Severity::Moderate, fault: Fault::None },
            ],
        }
    }

    /// Reject deployments the workers cannot start with
    pub fn validate(&self) -> CoreResult<()> {
        if self.drone.count == 0 {
            return Err(invalid("drone.count must be at least 1"));
        }
        let base_port = self.network.drone_base_port;
        let last_port = u32::from(base_port).checked_add(self.drone.count);
        if last_port.map_or(true, |port| port > u32::from(u16::MAX)) {
            return Err(invalid(format!(
                "{} drones from port {} exceed the port range",
                self.drone.count, base_port
            )));
        }
        if self.drone.water_capacity_l <= 0.0 || self.drone.flight_time_capacity_s <= 0.0 {
            return Err(invalid("drone capacities must be positive"));
        }
        if self.drone.drop_seconds_per_liter < 0.0 {
            return Err(invalid("drone.drop_seconds_per_liter must not be negative"));
        }
        if self.scheduler.stall_timeout_factor < 1.0 {
            return Err(invalid("scheduler.stall_timeout_factor must be at least 1.0"));
        }
        if self.scheduler.retry_interval_s <= 0.0 {
            return Err(invalid("scheduler.retry_interval_s must be positive"));
        }
        if self.simulation.time_scale <= 0.0 {
            return Err(invalid("simulation.time_scale must be positive"));
        }
        if !(0.0..1.0).contains(&self.network.loss_probability) {
            return Err(invalid("network.loss_probability must be in [0, 1)"));
        }

        let mut zone_ids = HashSet::new();
        for zone in &self.zones {
            if zone.id == BASE_ZONE_ID {
                return Err(invalid("zone id 0 is reserved for the base"));
            }
            if !zone_ids.insert(zone.id) {
                return Err(invalid(format!("duplicate zone id {}", zone.id)));
            }
        }
        for incident in &self.incidents {
            if !zone_ids.contains(&incident.zone_id) {
                return Err(invalid(format!(
                    "incident references unknown zone {}",
                    incident.zone_id
                )));
            }
        }

        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> CoreError {
    CoreError::InvalidConfig(reason.into())
}
