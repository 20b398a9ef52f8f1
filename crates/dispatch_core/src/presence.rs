//! Geo-presence store: where each driver is, whether it is still alive,
//! and whether it is taking rides.
//!
//! Liveness and availability are independent. A driver is *dispatchable*
//! only when both hold; [`GeoPresenceStore::query_nearby`] enforces this
//! and evicts drivers whose heartbeat lapsed from the availability set.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::config::DispatchConfig;
use crate::error::{lock_state, StoreError};
use crate::geo::{grid_disk_size, haversine_km, validate_radius, CellIndexMap, GeoIndex, GeoPoint};
use crate::types::DriverId;

/// One result of a nearby search, nearest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyDriver {
    pub driver_id: DriverId,
    pub lng: f64,
    pub lat: f64,
    pub distance_km: f64,
}

/// Snapshot of a driver's presence record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverPresence {
    pub driver_id: DriverId,
    pub position: Option<GeoPoint>,
    pub last_heartbeat_at_ms: Option<u64>,
    pub available: bool,
    pub alive: bool,
}

impl DriverPresence {
    pub fn is_dispatchable(&self) -> bool {
        self.available && self.alive
    }
}

pub trait GeoPresenceStore: Send + Sync {
    /// Upsert the driver's position and refresh its heartbeat.
    fn update_location(&self, driver_id: &DriverId, position: GeoPoint) -> Result<(), StoreError>;

    /// Set or clear the availability flag. Liveness is untouched.
    fn set_availability(&self, driver_id: &DriverId, available: bool) -> Result<(), StoreError>;

    fn is_alive(&self, driver_id: &DriverId) -> Result<bool, StoreError>;

    fn is_available(&self, driver_id: &DriverId) -> Result<bool, StoreError>;

    /// Dispatchable drivers within `radius_km` of `center`, ascending by distance.
    fn query_nearby(
        &self,
        center: GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<NearbyDriver>, StoreError>;

    fn presence(&self, driver_id: &DriverId) -> Result<Option<DriverPresence>, StoreError>;

    /// Forget a driver entirely (logout).
    fn remove(&self, driver_id: &DriverId) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct PresenceState {
    positions: HashMap<DriverId, GeoPoint>,
    cells: CellIndexMap,
    heartbeats: HashMap<DriverId, u64>,
    available: HashSet<DriverId>,
}

impl PresenceState {
    fn is_alive(&self, driver_id: &DriverId, now_ms: u64, ttl_ms: u64) -> bool {
        self.heartbeats
            .get(driver_id)
            .is_some_and(|&beat| now_ms.saturating_sub(beat) < ttl_ms)
    }
}

/// Single-process presence store backed by an H3 cell index.
pub struct InMemoryPresenceStore {
    clock: Arc<dyn Clock>,
    heartbeat_ttl: Duration,
    overfetch_multiplier: usize,
    index: GeoIndex,
    state: Mutex<PresenceState>,
}

impl InMemoryPresenceStore {
    pub fn new(config: &DispatchConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            heartbeat_ttl: config.heartbeat_ttl(),
            overfetch_multiplier: config.overfetch_multiplier.max(1),
            index: GeoIndex::with_resolution(config.geo_resolution),
            state: Mutex::new(PresenceState::default()),
        }
    }

    fn ttl_ms(&self) -> u64 {
        self.heartbeat_ttl.as_millis() as u64
    }

    /// Drivers whose position lies within `radius_km`, nearest first.
    fn within_radius(
        &self,
        state: &PresenceState,
        center: GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<(DriverId, GeoPoint, f64)>, StoreError> {
        let rings = self.index.rings_for_radius(radius_km);
        // Scanning every position beats walking a disk with more cells than drivers.
        let candidates: Vec<DriverId> = if grid_disk_size(rings) > state.cells.len() {
            state.positions.keys().cloned().collect()
        } else {
            let origin = self.index.cell_for(center)?;
            let disk = self.index.grid_disk(origin, rings);
            state.cells.drivers_in_cells(&disk)
        };

        let mut hits: Vec<(DriverId, GeoPoint, f64)> = candidates
            .into_iter()
            .filter_map(|driver_id| {
                let position = *state.positions.get(&driver_id)?;
                let distance_km = haversine_km(center, position);
                (distance_km <= radius_km).then_some((driver_id, position, distance_km))
            })
            .collect();
        hits.sort_by(|a, b| a.2.total_cmp(&b.2).then_with(|| a.0.cmp(&b.0)));
        Ok(hits)
    }
}

impl GeoPresenceStore for InMemoryPresenceStore {
    fn update_location(&self, driver_id: &DriverId, position: GeoPoint) -> Result<(), StoreError> {
        let cell = self.index.cell_for(position)?;
        let now_ms = self.clock.now_ms();
        let mut state = lock_state(&self.state, "presence")?;
        state.positions.insert(driver_id.clone(), position);
        state.cells.upsert(driver_id, cell);
        state.heartbeats.insert(driver_id.clone(), now_ms);
        Ok(())
    }

    fn set_availability(&self, driver_id: &DriverId, available: bool) -> Result<(), StoreError> {
        let mut state = lock_state(&self.state, "presence")?;
        if available {
            state.available.insert(driver_id.clone());
        } else {
            state.available.remove(driver_id);
        }
        Ok(())
    }

    fn is_alive(&self, driver_id: &DriverId) -> Result<bool, StoreError> {
        let now_ms = self.clock.now_ms();
        let state = lock_state(&self.state, "presence")?;
        Ok(state.is_alive(driver_id, now_ms, self.ttl_ms()))
    }

    fn is_available(&self, driver_id: &DriverId) -> Result<bool, StoreError> {
        let state = lock_state(&self.state, "presence")?;
        Ok(state.available.contains(driver_id))
    }

    fn query_nearby(
        &self,
        center: GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<NearbyDriver>, StoreError> {
        center.validate()?;
        validate_radius(radius_km)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let now_ms = self.clock.now_ms();
        let ttl_ms = self.ttl_ms();
        let mut state = lock_state(&self.state, "presence")?;

        let mut hits = self.within_radius(&state, center, radius_km)?;
        hits.truncate(limit.saturating_mul(self.overfetch_multiplier));

        let mut nearby = Vec::with_capacity(limit);
        for (driver_id, position, distance_km) in hits {
            if !state.available.contains(&driver_id) {
                continue;
            }
            if !state.is_alive(&driver_id, now_ms, ttl_ms) {
                debug!(driver_id = %driver_id, "evicting stale driver from availability set");
                state.available.remove(&driver_id);
                continue;
            }
            nearby.push(NearbyDriver {
                driver_id,
                lng: position.lng,
                lat: position.lat,
                distance_km,
            });
            if nearby.len() == limit {
                break;
            }
        }
        Ok(nearby)
    }

    fn presence(&self, driver_id: &DriverId) -> Result<Option<DriverPresence>, StoreError> {
        let now_ms = self.clock.now_ms();
        let state = lock_state(&self.state, "presence")?;
        let position = state.positions.get(driver_id).copied();
        let last_heartbeat_at_ms = state.heartbeats.get(driver_id).copied();
        let available = state.available.contains(driver_id);
        if position.is_none() && last_heartbeat_at_ms.is_none() && !available {
            return Ok(None);
        }
        Ok(Some(DriverPresence {
            driver_id: driver_id.clone(),
            position,
            last_heartbeat_at_ms,
            available,
            alive: state.is_alive(driver_id, now_ms, self.ttl_ms()),
        }))
    }

    fn remove(&self, driver_id: &DriverId) -> Result<(), StoreError> {
        let mut state = lock_state(&self.state, "presence")?;
        state.positions.remove(driver_id);
        state.cells.remove(driver_id);
        state.heartbeats.remove(driver_id);
        state.available.remove(driver_id);
        Ok(())
    }
}
