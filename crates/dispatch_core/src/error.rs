//! Error types for each dispatch layer.

use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use crate::types::{DriverId, RideId};

/// Coordinate or radius rejected before it reaches an index.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GeoError {
    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),
    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),
    #[error("search radius {0} km must be finite and positive")]
    Radius(f64),
}

/// Failure of a presence, lock, queue or assignment backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend could not be reached. Never retried inside the dispatch components.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store state poisoned: {0}")]
    Poisoned(&'static str),
    #[error(transparent)]
    InvalidCoordinates(#[from] GeoError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("failed to parse dispatch config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("ride {0} is already being dispatched")]
    AlreadyDispatching(RideId),
    #[error("ride {ride_id} is already assigned to driver {driver_id}")]
    AlreadyAssigned { ride_id: RideId, driver_id: DriverId },
    /// Late, duplicate or misaddressed response. Dispatch state is left as is.
    #[error("driver {driver_id} holds no pending offer for ride {ride_id}")]
    InvalidOffer { ride_id: RideId, driver_id: DriverId },
    #[error("ride {0} is not being dispatched")]
    UnknownRide(RideId),
    #[error(transparent)]
    InvalidCoordinates(#[from] GeoError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidCoordinates(geo) => DispatchError::InvalidCoordinates(geo),
            other => DispatchError::Store(other),
        }
    }
}

/// Locks backend state, surfacing a poisoned mutex as a store failure.
pub(crate) fn lock_state<'a, T>(
    state: &'a Mutex<T>,
    what: &'static str,
) -> Result<MutexGuard<'a, T>, StoreError> {
    state.lock().map_err(|_| StoreError::Poisoned(what))
}
