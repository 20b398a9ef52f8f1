//! Spatial operations: coordinates, H3 indexing and distance calculations.
//!
//! This module provides:
//!
//! - **GeoPoint**: WGS84 longitude/latitude pair with range validation
//! - **GeoIndex**: H3 resolution wrapper that turns a radius into a cached grid disk
//! - **CellIndexMap**: H3 cell → driver mappings for incremental position updates
//! - **haversine_km**: great-circle distance between two points

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use h3o::{CellIndex, LatLng, Resolution};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::error::GeoError;
use crate::types::DriverId;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Farthest any two points on Earth can be apart along the surface.
const HALF_CIRCUMFERENCE_KM: f64 = std::f64::consts::PI * EARTH_RADIUS_KM;

/// Grid disks are reused across searches from the same pickup cell.
const GRID_DISK_CACHE_SIZE: usize = 1_000;

/// Fraction of the mean cell spacing assumed when converting km to grid rings.
/// Cells shrink away from the icosahedron face centers, so the ring count is padded.
const MIN_SPACING_FACTOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lng: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    pub fn validate(&self) -> Result<(), GeoError> {
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(GeoError::Longitude(self.lng));
        }
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(GeoError::Latitude(self.lat));
        }
        Ok(())
    }

    fn to_lat_lng(self) -> Result<LatLng, GeoError> {
        self.validate()?;
        LatLng::new(self.lat, self.lng).map_err(|_| GeoError::Latitude(self.lat))
    }
}

pub fn validate_radius(radius_km: f64) -> Result<(), GeoError> {
    if radius_km.is_finite() && radius_km > 0.0 {
        Ok(())
    } else {
        Err(GeoError::Radius(radius_km))
    }
}

/// Great-circle distance in kilometers.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lng.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Number of cells in a grid disk of `k` rings.
pub fn grid_disk_size(k: u32) -> usize {
    let k = k as usize;
    k.saturating_add(1)
        .saturating_mul(k)
        .saturating_mul(3)
        .saturating_add(1)
}

#[derive(Debug)]
pub struct GeoIndex {
    resolution: Resolution,
    disk_cache: Mutex<LruCache<(CellIndex, u32), Vec<CellIndex>>>,
}

impl GeoIndex {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            disk_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(GRID_DISK_CACHE_SIZE).expect("cache size must be non-zero"),
            )),
        }
    }

    /// Falls back to resolution 7 for out-of-range values; config validation rejects those first.
    pub fn with_resolution(resolution: u8) -> Self {
        Self::new(Resolution::try_from(resolution).unwrap_or(Resolution::Seven))
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn cell_for(&self, point: GeoPoint) -> Result<CellIndex, GeoError> {
        Ok(point.to_lat_lng()?.to_cell(self.resolution))
    }

    /// Ring count whose grid disk covers every point within `radius_km` of the origin cell.
    ///
    /// Radii beyond half the Earth's circumference cover nothing more, so the
    /// count is capped there.
    pub fn rings_for_radius(&self, radius_km: f64) -> u32 {
        let spacing_km = self.resolution.edge_length_km() * 3f64.sqrt() * MIN_SPACING_FACTOR;
        let radius_km = radius_km.min(HALF_CIRCUMFERENCE_KM);
        ((radius_km / spacing_km).ceil() as u32).saturating_add(1)
    }

    pub fn grid_disk(&self, origin: CellIndex, k: u32) -> Vec<CellIndex> {
        debug_assert_eq!(
            origin.resolution(),
            self.resolution,
            "origin resolution must match GeoIndex resolution"
        );
        let mut cache = match self.disk_cache.lock() {
            Ok(guard) => guard,
            Err(_) => return origin.grid_disk::<Vec<_>>(k),
        };
        cache
            .get_or_insert((origin, k), || origin.grid_disk::<Vec<_>>(k))
            .clone()
    }
}

impl Default for GeoIndex {
    fn default() -> Self {
        Self::new(Resolution::Seven)
    }
}

/// H3 cell → driver mapping, kept in step with driver heartbeats.
#[derive(Debug, Default)]
pub struct CellIndexMap {
    drivers_by_cell: HashMap<CellIndex, Vec<DriverId>>,
    driver_to_cell: HashMap<DriverId, CellIndex>,
}

impl CellIndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a driver in `cell`, moving it out of its previous cell if needed.
    pub fn upsert(&mut self, driver_id: &DriverId, cell: CellIndex) {
        match self.driver_to_cell.get(driver_id).copied() {
            Some(old_cell) if old_cell == cell => return,
            Some(old_cell) => self.detach(driver_id, old_cell),
            None => {}
        }
        self.drivers_by_cell
            .entry(cell)
            .or_default()
            .push(driver_id.clone());
        self.driver_to_cell.insert(driver_id.clone(), cell);
    }

    pub fn remove(&mut self, driver_id: &DriverId) {
        if let Some(cell) = self.driver_to_cell.remove(driver_id) {
            self.detach(driver_id, cell);
        }
    }

    pub fn drivers_in_cells(&self, cells: &[CellIndex]) -> Vec<DriverId> {
        let mut result = Vec::new();
        for cell in cells {
            if let Some(drivers) = self.drivers_by_cell.get(cell) {
                result.extend(drivers.iter().cloned());
            }
        }
        result
    }

    pub fn cell_of(&self, driver_id: &DriverId) -> Option<CellIndex> {
        self.driver_to_cell.get(driver_id).copied()
    }

    pub fn len(&self) -> usize {
        self.driver_to_cell.len()
    }

    pub fn is_empty(&self) -> bool {
        self.driver_to_cell.is_empty()
    }

    fn detach(&mut self, driver_id: &DriverId, cell: CellIndex) {
        if let Some(drivers) = self.drivers_by_cell.get_mut(&cell) {
            drivers.retain(|d| d != driver_id);
            if drivers.is_empty() {
                self.drivers_by_cell.remove(&cell);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        assert!(GeoPoint::new(77.17, 31.10).validate().is_ok());
        assert_eq!(
            GeoPoint::new(181.0, 0.0).validate(),
            Err(GeoError::Longitude(181.0))
        );
        assert_eq!(
            GeoPoint::new(0.0, -90.5).validate(),
            Err(GeoError::Latitude(-90.5))
        );
        assert!(GeoPoint::new(f64::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn haversine_matches_known_distance() {
        let ridge = GeoPoint::new(77.1734, 31.1048);
        let same = haversine_km(ridge, ridge);
        assert!(same.abs() < 1e-9);

        // One degree of latitude is ~111.2 km anywhere.
        let north = GeoPoint::new(77.1734, 32.1048);
        let d = haversine_km(ridge, north);
        assert!((d - 111.19).abs() < 0.1, "got {d}");
    }

    #[test]
    fn grid_disk_covers_the_requested_radius() {
        let index = GeoIndex::default();
        let origin_point = GeoPoint::new(77.1734, 31.1048);
        let origin = index.cell_for(origin_point).expect("cell");
        let k = index.rings_for_radius(10.0);
        let disk = index.grid_disk(origin, k);
        assert_eq!(disk.len(), grid_disk_size(k));

        // A point 9.5 km due east must fall inside the disk.
        let east = GeoPoint::new(77.1734 + 9.5 / (111.32 * 31.1048f64.to_radians().cos()), 31.1048);
        assert!(haversine_km(origin_point, east) < 10.0);
        let east_cell = index.cell_for(east).expect("cell");
        assert!(disk.contains(&east_cell));
    }

    #[test]
    fn huge_radius_is_capped_at_half_the_globe() {
        let index = GeoIndex::default();
        let globe = index.rings_for_radius(HALF_CIRCUMFERENCE_KM);
        assert_eq!(index.rings_for_radius(1e10), globe);
        assert_eq!(index.rings_for_radius(f64::MAX), globe);
        assert!(globe > index.rings_for_radius(10.0));
        assert_eq!(grid_disk_size(u32::MAX), usize::MAX);
    }

    #[test]
    fn cell_map_moves_drivers_between_cells() {
        let index = GeoIndex::default();
        let a = index.cell_for(GeoPoint::new(77.17, 31.10)).expect("cell");
        let b = index.cell_for(GeoPoint::new(77.40, 31.30)).expect("cell");
        assert_ne!(a, b);

        let mut map = CellIndexMap::new();
        let driver = DriverId::from("D1");
        map.upsert(&driver, a);
        assert_eq!(map.drivers_in_cells(&[a]), vec![driver.clone()]);

        map.upsert(&driver, b);
        assert!(map.drivers_in_cells(&[a]).is_empty());
        assert_eq!(map.cell_of(&driver), Some(b));
        assert_eq!(map.len(), 1);

        map.remove(&driver);
        assert!(map.is_empty());
        assert!(map.drivers_in_cells(&[b]).is_empty());
    }
}
