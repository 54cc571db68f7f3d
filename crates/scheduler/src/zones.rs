//! Zone registry

use emberwatch_core::{Bounds, Coordinate, Zone, ZoneId, BASE_ZONE_ID};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First registration of this id
    Added,
    /// Same id and bounds seen before; nothing changed
    Unchanged,
    /// Id already registered with different bounds; the first one is kept
    Conflict,
    /// Id reserved for the base
    Reserved,
}

/// Known fire zones, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ZoneRegistry {
    zones: BTreeMap<ZoneId, Zone>,
}

impl ZoneRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a zone; repeated registration of the same zone is a no-op
    pub fn register(&mut self, id: ZoneId, bounds: Bounds) -> Registration {
        if id == BASE_ZONE_ID {
            warn!(zone_id = id, "Zone id reserved for the base, registration refused");
            return Registration::Reserved;
        }

        match self.zones.get(&id) {
            Some(existing) if existing.bounds == bounds => Registration::Unchanged,
            Some(existing) => {
                warn!(
                    zone_id = id,
                    center = %existing.center,
                    "Zone re-registered with different bounds, keeping the original"
                );
                Registration::Conflict
            }
            None => {
                let zone = Zone::new(id, bounds);
                debug!(zone_id = id, center = %zone.center, "Zone registered");
                self.zones.insert(id, zone);
                Registration::Added
            }
        }
    }

    /// Look up a zone
    pub fn get(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.get(&id)
    }

    /// Dispatch target of a zone
    pub fn center(&self, id: ZoneId) -> Option<Coordinate> {
        self.zones.get(&id).map(|zone| zone.center)
    }

    /// Whether a zone is known
    pub fn contains(&self, id: ZoneId) -> bool {
        self.zones.contains_key(&id)
    }

    /// Zones in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    /// Number of registered zones
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Whether no zone is registered
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}
