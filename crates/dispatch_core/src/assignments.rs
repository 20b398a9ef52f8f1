//! Ride → driver assignment record.
//!
//! Stands in for the ride document store, which owns the authoritative ride
//! record. The dispatcher only needs a write-once assignment.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{lock_state, StoreError};
use crate::types::{DriverId, RideId};

pub trait RideAssignments: Send + Sync {
    /// Record the assignment; `false` if the ride already has a driver.
    fn assign(&self, ride_id: &RideId, driver_id: &DriverId) -> Result<bool, StoreError>;

    fn assigned_driver(&self, ride_id: &RideId) -> Result<Option<DriverId>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryRideAssignments {
    assignments: Mutex<HashMap<RideId, DriverId>>,
}

impl InMemoryRideAssignments {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RideAssignments for InMemoryRideAssignments {
    fn assign(&self, ride_id: &RideId, driver_id: &DriverId) -> Result<bool, StoreError> {
        let mut assignments = lock_state(&self.assignments, "assignments")?;
        if assignments.contains_key(ride_id) {
            return Ok(false);
        }
        assignments.insert(ride_id.clone(), driver_id.clone());
        Ok(true)
    }

    fn assigned_driver(&self, ride_id: &RideId) -> Result<Option<DriverId>, StoreError> {
        Ok(lock_state(&self.assignments, "assignments")?
            .get(ride_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_is_write_once() {
        let assignments = InMemoryRideAssignments::new();
        let ride = RideId::from("ride1");

        assert!(assignments.assign(&ride, &DriverId::from("D1")).expect("assign"));
        assert!(!assignments.assign(&ride, &DriverId::from("D2")).expect("assign"));
        assert_eq!(
            assignments.assigned_driver(&ride).expect("lookup"),
            Some(DriverId::from("D1"))
        );
    }
}
