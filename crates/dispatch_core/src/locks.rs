//! Offer lock manager: at most one pending offer per ride and at most one
//! outstanding claim per driver.
//!
//! Both claims are TTL entries created with a single check-and-set. An offer
//! counts as extended only once both are held.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::clock::Clock;
use crate::error::{lock_state, StoreError};
use crate::types::{DriverId, RideId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingOffer {
    pub ride_id: RideId,
    pub driver_id: DriverId,
    pub expires_at_ms: u64,
}

pub trait OfferLockManager: Send + Sync {
    /// Create the ride's pending offer unless one is already live.
    fn try_offer(&self, ride_id: &RideId, driver_id: &DriverId, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Claim a driver for `ride_id`. Fails while another ride holds the claim;
    /// re-claiming by the same ride refreshes the TTL.
    fn try_lock_driver(
        &self,
        driver_id: &DriverId,
        ride_id: &RideId,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    fn pending_offer(&self, ride_id: &RideId) -> Result<Option<PendingOffer>, StoreError>;

    fn get_offer(&self, ride_id: &RideId) -> Result<Option<DriverId>, StoreError> {
        Ok(self.pending_offer(ride_id)?.map(|offer| offer.driver_id))
    }

    fn driver_lock_holder(&self, driver_id: &DriverId) -> Result<Option<RideId>, StoreError>;

    fn clear_offer(&self, ride_id: &RideId) -> Result<(), StoreError>;

    /// Release the driver's claim if `ride_id` still holds it. Idempotent.
    fn unlock_driver(&self, driver_id: &DriverId, ride_id: &RideId) -> Result<(), StoreError>;

    /// Drop lapsed entries; returns how many were removed.
    fn purge_expired(&self) -> Result<usize, StoreError>;
}

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at_ms: u64,
}

impl<T> Expiring<T> {
    fn is_live(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at_ms
    }
}

#[derive(Debug, Default)]
struct LockState {
    offers: HashMap<RideId, Expiring<DriverId>>,
    driver_locks: HashMap<DriverId, Expiring<RideId>>,
}

pub struct InMemoryOfferLocks {
    clock: Arc<dyn Clock>,
    state: Mutex<LockState>,
}

impl InMemoryOfferLocks {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(LockState::default()),
        }
    }
}

impl OfferLockManager for InMemoryOfferLocks {
    fn try_offer(
        &self,
        ride_id: &RideId,
        driver_id: &DriverId,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now_ms = self.clock.now_ms();
        let mut state = lock_state(&self.state, "offer locks")?;
        if state
            .offers
            .get(ride_id)
            .is_some_and(|offer| offer.is_live(now_ms))
        {
            return Ok(false);
        }
        state.offers.insert(
            ride_id.clone(),
            Expiring {
                value: driver_id.clone(),
                expires_at_ms: self.clock.deadline_after(ttl),
            },
        );
        Ok(true)
    }

    fn try_lock_driver(
        &self,
        driver_id: &DriverId,
        ride_id: &RideId,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now_ms = self.clock.now_ms();
        let mut state = lock_state(&self.state, "offer locks")?;
        if let Some(lock) = state.driver_locks.get(driver_id) {
            if lock.is_live(now_ms) && &lock.value != ride_id {
                return Ok(false);
            }
        }
        state.driver_locks.insert(
            driver_id.clone(),
            Expiring {
                value: ride_id.clone(),
                expires_at_ms: self.clock.deadline_after(ttl),
            },
        );
        Ok(true)
    }

    fn pending_offer(&self, ride_id: &RideId) -> Result<Option<PendingOffer>, StoreError> {
        let now_ms = self.clock.now_ms();
        let state = lock_state(&self.state, "offer locks")?;
        Ok(state
            .offers
            .get(ride_id)
            .filter(|offer| offer.is_live(now_ms))
            .map(|offer| PendingOffer {
                ride_id: ride_id.clone(),
                driver_id: offer.value.clone(),
                expires_at_ms: offer.expires_at_ms,
            }))
    }

    fn driver_lock_holder(&self, driver_id: &DriverId) -> Result<Option<RideId>, StoreError> {
        let now_ms = self.clock.now_ms();
        let state = lock_state(&self.state, "offer locks")?;
        Ok(state
            .driver_locks
            .get(driver_id)
            .filter(|lock| lock.is_live(now_ms))
            .map(|lock| lock.value.clone()))
    }

    fn clear_offer(&self, ride_id: &RideId) -> Result<(), StoreError> {
        let mut state = lock_state(&self.state, "offer locks")?;
        state.offers.remove(ride_id);
        Ok(())
    }

    fn unlock_driver(&self, driver_id: &DriverId, ride_id: &RideId) -> Result<(), StoreError> {
        let mut state = lock_state(&self.state, "offer locks")?;
        if state
            .driver_locks
            .get(driver_id)
            .is_some_and(|lock| &lock.value == ride_id)
        {
            state.driver_locks.remove(driver_id);
        }
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        let now_ms = self.clock.now_ms();
        let mut state = lock_state(&self.state, "offer locks")?;
        let before = state.offers.len() + state.driver_locks.len();
        state.offers.retain(|_, offer| offer.is_live(now_ms));
        state.driver_locks.retain(|_, lock| lock.is_live(now_ms));
        Ok(before - state.offers.len() - state.driver_locks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const OFFER_TTL: Duration = Duration::from_secs(20);
    const LOCK_TTL: Duration = Duration::from_secs(25);

    fn locks() -> (Arc<ManualClock>, InMemoryOfferLocks) {
        let clock = Arc::new(ManualClock::new(0));
        (clock.clone(), InMemoryOfferLocks::new(clock))
    }

    #[test]
    fn second_offer_for_same_ride_is_refused_until_expiry() {
        let (clock, locks) = locks();
        let ride = RideId::from("ride1");
        let d1 = DriverId::from("D1");
        let d2 = DriverId::from("D2");

        assert!(locks.try_offer(&ride, &d1, OFFER_TTL).expect("offer"));
        assert!(!locks.try_offer(&ride, &d2, OFFER_TTL).expect("offer"));
        assert_eq!(locks.get_offer(&ride).expect("get"), Some(d1.clone()));

        clock.advance_secs(20);
        assert_eq!(locks.get_offer(&ride).expect("get"), None);
        assert!(locks.try_offer(&ride, &d2, OFFER_TTL).expect("offer"));
        let offer = locks.pending_offer(&ride).expect("get").expect("live offer");
        assert_eq!(offer.driver_id, d2);
        assert_eq!(offer.expires_at_ms, 40_000);
    }

    #[test]
    fn driver_lock_is_exclusive_across_rides() {
        let (_clock, locks) = locks();
        let driver = DriverId::from("D1");
        let ride_a = RideId::from("a");
        let ride_b = RideId::from("b");

        assert!(locks.try_lock_driver(&driver, &ride_a, LOCK_TTL).expect("lock"));
        assert!(!locks.try_lock_driver(&driver, &ride_b, LOCK_TTL).expect("lock"));
        assert!(locks.try_lock_driver(&driver, &ride_a, LOCK_TTL).expect("relock"));
        assert_eq!(locks.driver_lock_holder(&driver).expect("holder"), Some(ride_a));
    }

    #[test]
    fn unlock_only_releases_the_holders_claim() {
        let (clock, locks) = locks();
        let driver = DriverId::from("D1");
        let ride_a = RideId::from("a");
        let ride_b = RideId::from("b");

        assert!(locks.try_lock_driver(&driver, &ride_a, LOCK_TTL).expect("lock"));
        clock.advance_secs(25);
        assert!(locks.try_lock_driver(&driver, &ride_b, LOCK_TTL).expect("lock"));

        // A late release from ride a must not free ride b's claim.
        locks.unlock_driver(&driver, &ride_a).expect("unlock");
        assert_eq!(
            locks.driver_lock_holder(&driver).expect("holder"),
            Some(ride_b.clone())
        );

        locks.unlock_driver(&driver, &ride_b).expect("unlock");
        locks.unlock_driver(&driver, &ride_b).expect("unlock twice");
        assert_eq!(locks.driver_lock_holder(&driver).expect("holder"), None);
    }

    #[test]
    fn purge_drops_only_lapsed_entries() {
        let (clock, locks) = locks();
        let ride = RideId::from("ride1");
        let driver = DriverId::from("D1");
        assert!(locks.try_offer(&ride, &driver, OFFER_TTL).expect("offer"));
        assert!(locks.try_lock_driver(&driver, &ride, LOCK_TTL).expect("lock"));

        clock.advance_secs(21);
        assert_eq!(locks.purge_expired().expect("purge"), 1);
        assert!(locks.driver_lock_holder(&driver).expect("holder").is_some());

        clock.advance_secs(5);
        assert_eq!(locks.purge_expired().expect("purge"), 1);
        assert_eq!(locks.purge_expired().expect("purge"), 0);
    }

    #[test]
    fn concurrent_offers_for_one_ride_admit_exactly_one() {
        let (_clock, locks) = locks();
        let ride = RideId::from("contended");
        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let locks = &locks;
                    let ride = &ride;
                    scope.spawn(move || {
                        locks
                            .try_offer(ride, &DriverId::new(format!("D{i}")), OFFER_TTL)
                            .expect("offer")
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("thread"))
                .filter(|won| *won)
                .count()
        });
        assert_eq!(winners, 1);
    }

    #[test]
    fn concurrent_driver_claims_admit_exactly_one_ride() {
        let (_clock, locks) = locks();
        let driver = DriverId::from("D1");
        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let locks = &locks;
                    let driver = &driver;
                    scope.spawn(move || {
                        locks
                            .try_lock_driver(driver, &RideId::new(format!("ride{i}")), LOCK_TTL)
                            .expect("lock")
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("thread"))
                .filter(|won| *won)
                .count()
        });
        assert_eq!(winners, 1);
    }
}
