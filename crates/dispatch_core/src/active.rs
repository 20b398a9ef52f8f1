//! Set of rides currently being dispatched.
//!
//! Membership is claimed atomically when a dispatch starts, which is what
//! turns a duplicate `start_dispatch` into a no-op. The periodic sweep walks
//! this set to find stalled offers.

use std::collections::BTreeSet;
use std::sync::Mutex;

use crate::error::{lock_state, StoreError};
use crate::types::RideId;

pub trait ActiveDispatchSet: Send + Sync {
    /// Add the ride; `false` when it was already present.
    fn try_insert(&self, ride_id: &RideId) -> Result<bool, StoreError>;

    fn remove(&self, ride_id: &RideId) -> Result<(), StoreError>;

    fn contains(&self, ride_id: &RideId) -> Result<bool, StoreError>;

    fn members(&self) -> Result<Vec<RideId>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryActiveDispatches {
    rides: Mutex<BTreeSet<RideId>>,
}

impl InMemoryActiveDispatches {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActiveDispatchSet for InMemoryActiveDispatches {
    fn try_insert(&self, ride_id: &RideId) -> Result<bool, StoreError> {
        Ok(lock_state(&self.rides, "active dispatches")?.insert(ride_id.clone()))
    }

    fn remove(&self, ride_id: &RideId) -> Result<(), StoreError> {
        lock_state(&self.rides, "active dispatches")?.remove(ride_id);
        Ok(())
    }

    fn contains(&self, ride_id: &RideId) -> Result<bool, StoreError> {
        Ok(lock_state(&self.rides, "active dispatches")?.contains(ride_id))
    }

    fn members(&self) -> Result<Vec<RideId>, StoreError> {
        Ok(lock_state(&self.rides, "active dispatches")?
            .iter()
            .cloned()
            .collect())
    }
}
