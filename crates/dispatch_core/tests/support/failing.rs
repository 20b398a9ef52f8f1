use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dispatch_core::active::{ActiveDispatchSet, InMemoryActiveDispatches};
use dispatch_core::clock::Clock;
use dispatch_core::error::StoreError;
use dispatch_core::geo::GeoPoint;
use dispatch_core::locks::{InMemoryOfferLocks, OfferLockManager, PendingOffer};
use dispatch_core::presence::{DriverPresence, GeoPresenceStore, NearbyDriver};
use dispatch_core::{DriverId, RideId};

/// Presence backend whose connection is gone.
pub struct UnreachablePresence;

fn unreachable() -> StoreError {
    StoreError::Unavailable("connection refused".to_string())
}

impl GeoPresenceStore for UnreachablePresence {
    fn update_location(&self, _: &DriverId, _: GeoPoint) -> Result<(), StoreError> {
        Err(unreachable())
    }

    fn set_availability(&self, _: &DriverId, _: bool) -> Result<(), StoreError> {
        Err(unreachable())
    }

    fn is_alive(&self, _: &DriverId) -> Result<bool, StoreError> {
        Err(unreachable())
    }

    fn is_available(&self, _: &DriverId) -> Result<bool, StoreError> {
        Err(unreachable())
    }

    fn query_nearby(&self, _: GeoPoint, _: f64, _: usize) -> Result<Vec<NearbyDriver>, StoreError> {
        Err(unreachable())
    }

    fn presence(&self, _: &DriverId) -> Result<Option<DriverPresence>, StoreError> {
        Err(unreachable())
    }

    fn remove(&self, _: &DriverId) -> Result<(), StoreError> {
        Err(unreachable())
    }
}

/// In-memory locks whose claim operations can be switched off, as if the
/// backend dropped out between two calls.
pub struct FlakyLocks {
    inner: InMemoryOfferLocks,
    claims_down: AtomicBool,
}

impl FlakyLocks {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: InMemoryOfferLocks::new(clock),
            claims_down: AtomicBool::new(false),
        }
    }

    pub fn set_claims_down(&self, down: bool) {
        self.claims_down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.claims_down.load(Ordering::SeqCst) {
            Err(unreachable())
        } else {
            Ok(())
        }
    }
}

impl OfferLockManager for FlakyLocks {
    fn try_offer(&self, ride_id: &RideId, driver_id: &DriverId, ttl: Duration) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.try_offer(ride_id, driver_id, ttl)
    }

    fn try_lock_driver(&self, driver_id: &DriverId, ride_id: &RideId, ttl: Duration) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.try_lock_driver(driver_id, ride_id, ttl)
    }

    fn pending_offer(&self, ride_id: &RideId) -> Result<Option<PendingOffer>, StoreError> {
        self.inner.pending_offer(ride_id)
    }

    fn driver_lock_holder(&self, driver_id: &DriverId) -> Result<Option<RideId>, StoreError> {
        self.inner.driver_lock_holder(driver_id)
    }

    fn clear_offer(&self, ride_id: &RideId) -> Result<(), StoreError> {
        self.inner.clear_offer(ride_id)
    }

    fn unlock_driver(&self, driver_id: &DriverId, ride_id: &RideId) -> Result<(), StoreError> {
        self.inner.unlock_driver(driver_id, ride_id)
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        self.inner.purge_expired()
    }
}

/// Active set whose `members` listing lags behind removals, like a sweep
/// that took its snapshot just before a ride finished.
#[derive(Default)]
pub struct LaggingActiveSet {
    inner: InMemoryActiveDispatches,
    stale: Mutex<Vec<RideId>>,
}

impl LaggingActiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep listing `ride_id` from `members` after it is removed.
    pub fn keep_listing(&self, ride_id: &RideId) {
        self.stale.lock().expect("stale list").push(ride_id.clone());
    }
}

impl ActiveDispatchSet for LaggingActiveSet {
    fn try_insert(&self, ride_id: &RideId) -> Result<bool, StoreError> {
        self.inner.try_insert(ride_id)
    }

    fn remove(&self, ride_id: &RideId) -> Result<(), StoreError> {
        self.inner.remove(ride_id)
    }

    fn contains(&self, ride_id: &RideId) -> Result<bool, StoreError> {
        self.inner.contains(ride_id)
    }

    fn members(&self) -> Result<Vec<RideId>, StoreError> {
        let mut members = self.inner.members()?;
        for ride_id in self.stale.lock().expect("stale list").iter() {
            if !members.contains(ride_id) {
                members.push(ride_id.clone());
            }
        }
        Ok(members)
    }
}
