//! Dispatch orchestrator: matches one ride to one accepting driver.
//!
//! Each ride in flight owns an explicit [`DispatchState`] behind its own
//! mutex, so transitions for one ride are strictly sequential while rides
//! proceed independently. The stores are touched only as side effects of a
//! transition:
//!
//! ```text
//! Idle → Searching → Offering → AwaitingResponse ─┬→ Accepted
//!                       ↑                         ├→ (reject / timeout) → Offering
//!                       └─────────────────────────┤
//!                                                 ├→ Exhausted
//!                                                 └→ Aborted
//! ```
//!
//! Calls never block for a driver's answer: `start_dispatch` returns as soon
//! as the first offer is out, and the answer arrives later through
//! `respond_to_offer` or is detected as a timeout by `sweep_expired`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::active::{ActiveDispatchSet, InMemoryActiveDispatches};
use crate::assignments::{InMemoryRideAssignments, RideAssignments};
use crate::clock::Clock;
use crate::config::DispatchConfig;
use crate::error::{DispatchError, StoreError};
use crate::events::{DispatchEvent, EventPublisher, ExhaustionReason, RideStatus};
use crate::geo::{validate_radius, GeoPoint};
use crate::locks::{InMemoryOfferLocks, OfferLockManager};
use crate::presence::{GeoPresenceStore, InMemoryPresenceStore};
use crate::queue::{DispatchQueue, InMemoryDispatchQueue};
use crate::types::{DriverId, RideId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DispatchState {
    Idle,
    Searching,
    Offering,
    AwaitingResponse {
        driver_id: DriverId,
        expires_at_ms: u64,
    },
    Accepted {
        driver_id: DriverId,
    },
    Exhausted {
        reason: ExhaustionReason,
    },
    Aborted,
}

impl DispatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DispatchState::Accepted { .. } | DispatchState::Exhausted { .. } | DispatchState::Aborted
        )
    }

    fn awaiting(&self) -> Option<&DriverId> {
        match self {
            DispatchState::AwaitingResponse { driver_id, .. } => Some(driver_id),
            _ => None,
        }
    }
}

/// Result of a dispatch transition that reached a resting point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Offered {
        ride_id: RideId,
        driver_id: DriverId,
        expires_at_ms: u64,
    },
    Assigned {
        ride_id: RideId,
        driver_id: DriverId,
    },
    Exhausted {
        ride_id: RideId,
        reason: ExhaustionReason,
    },
    Aborted {
        ride_id: RideId,
    },
}

/// What one sweep pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub rides_checked: usize,
    pub offers_expired: usize,
    pub reoffered: usize,
    pub exhausted: usize,
    pub stalled_cleared: usize,
    /// Rides left mid-transition by a store error and picked up again.
    pub resumed: usize,
    pub failures: usize,
    pub locks_purged: usize,
}

impl SweepReport {
    pub fn is_idle(&self) -> bool {
        self.offers_expired == 0
            && self.stalled_cleared == 0
            && self.resumed == 0
            && self.failures == 0
    }

    fn record(&mut self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Offered { .. } => self.reoffered += 1,
            DispatchOutcome::Exhausted { .. } => self.exhausted += 1,
            DispatchOutcome::Assigned { .. } | DispatchOutcome::Aborted { .. } => {}
        }
    }
}

/// The stores and collaborators a dispatcher drives.
#[derive(Clone)]
pub struct DispatchPorts {
    pub presence: Arc<dyn GeoPresenceStore>,
    pub locks: Arc<dyn OfferLockManager>,
    pub queue: Arc<dyn DispatchQueue>,
    pub active: Arc<dyn ActiveDispatchSet>,
    pub assignments: Arc<dyn RideAssignments>,
    pub events: Arc<dyn EventPublisher>,
}

impl DispatchPorts {
    /// Single-process ports, all sharing `clock`.
    pub fn in_memory(
        config: &DispatchConfig,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            presence: Arc::new(InMemoryPresenceStore::new(config, clock.clone())),
            locks: Arc::new(InMemoryOfferLocks::new(clock.clone())),
            queue: Arc::new(InMemoryDispatchQueue::new(clock)),
            active: Arc::new(InMemoryActiveDispatches::new()),
            assignments: Arc::new(InMemoryRideAssignments::new()),
            events,
        }
    }
}

#[derive(Debug)]
struct RideDispatch {
    /// Distinguishes this dispatch from a later one for the same ride.
    generation: u64,
    pickup: GeoPoint,
    state: DispatchState,
    queue_expires_at_ms: u64,
    offers_made: u32,
}

type RideSlot = Arc<Mutex<RideDispatch>>;

#[derive(Debug, Clone)]
struct RideEntry {
    generation: u64,
    slot: RideSlot,
}

pub struct Dispatcher {
    config: DispatchConfig,
    clock: Arc<dyn Clock>,
    ports: DispatchPorts,
    rides: Mutex<HashMap<RideId, RideEntry>>,
    next_generation: AtomicU64,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig, clock: Arc<dyn Clock>, ports: DispatchPorts) -> Self {
        Self {
            config,
            clock,
            ports,
            rides: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn in_memory(
        config: DispatchConfig,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        let ports = DispatchPorts::in_memory(&config, clock.clone(), events);
        Self::new(config, clock, ports)
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn ports(&self) -> &DispatchPorts {
        &self.ports
    }

    // ── Driver-facing commands ─────────────────────────────────────────

    pub fn update_location(&self, driver_id: &DriverId, position: GeoPoint) -> Result<(), DispatchError> {
        self.ports.presence.update_location(driver_id, position)?;
        Ok(())
    }

    pub fn set_availability(&self, driver_id: &DriverId, available: bool) -> Result<(), DispatchError> {
        self.ports.presence.set_availability(driver_id, available)?;
        debug!(driver_id = %driver_id, available, "driver availability changed");
        Ok(())
    }

    // ── Ride-facing commands ───────────────────────────────────────────

    /// Start matching `ride_id`, returning once the first offer is out or
    /// the search came up empty.
    pub fn start_dispatch(
        &self,
        ride_id: &RideId,
        pickup: GeoPoint,
        radius_km: Option<f64>,
    ) -> Result<DispatchOutcome, DispatchError> {
        pickup.validate()?;
        let radius_km = radius_km.unwrap_or(self.config.default_radius_km);
        validate_radius(radius_km)?;

        if let Some(driver_id) = self.ports.assignments.assigned_driver(ride_id)? {
            return Err(DispatchError::AlreadyAssigned {
                ride_id: ride_id.clone(),
                driver_id,
            });
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(Mutex::new(RideDispatch {
            generation,
            pickup,
            state: DispatchState::Idle,
            queue_expires_at_ms: 0,
            offers_made: 0,
        }));
        let mut ride = lock_ride(&slot);
        {
            // Claim and register under one map lock so the sweep never sees
            // an active ride without its slot.
            let mut rides = self.rides_map();
            if !self.ports.active.try_insert(ride_id)? {
                warn!(ride_id = %ride_id, "duplicate dispatch request ignored");
                return Err(DispatchError::AlreadyDispatching(ride_id.clone()));
            }
            rides.insert(
                ride_id.clone(),
                RideEntry {
                    generation,
                    slot: slot.clone(),
                },
            );
        }

        info!(ride_id = %ride_id, lng = pickup.lng, lat = pickup.lat, radius_km, "dispatch started");
        let result = self.search(ride_id, &mut ride, radius_km);
        if let Err(err) = &result {
            warn!(ride_id = %ride_id, error = %err, "dispatch failed on store error");
            self.abandon(ride_id, &mut ride);
        }
        result
    }

    /// Apply a driver's answer to the ride's pending offer.
    pub fn respond_to_offer(
        &self,
        ride_id: &RideId,
        driver_id: &DriverId,
        accept: bool,
    ) -> Result<DispatchOutcome, DispatchError> {
        let invalid = || DispatchError::InvalidOffer {
            ride_id: ride_id.clone(),
            driver_id: driver_id.clone(),
        };
        let Some(slot) = self.ride_slot(ride_id) else {
            debug!(ride_id = %ride_id, driver_id = %driver_id, "response for a ride not in dispatch");
            return Err(invalid());
        };
        let mut ride = lock_ride(&slot);
        if ride.state.is_terminal() {
            return Err(invalid());
        }

        let offered_to = self.ports.locks.get_offer(ride_id)?;
        if offered_to.as_ref() != Some(driver_id) || ride.state.awaiting() != Some(driver_id) {
            // A response that arrives after the offer lapsed doubles as the
            // timeout signal when the sweep has not caught it yet.
            if offered_to.is_none() && ride.state.awaiting().is_some() {
                self.expire_offer(ride_id, &mut ride)?;
            }
            info!(ride_id = %ride_id, driver_id = %driver_id, accept, "stale or misaddressed offer response");
            return Err(invalid());
        }

        self.release_offer(ride_id, driver_id)?;
        if accept {
            self.finalize_assignment(ride_id, driver_id, &mut ride)
        } else {
            info!(ride_id = %ride_id, driver_id = %driver_id, "offer rejected");
            ride.state = DispatchState::Offering;
            self.offer_next(ride_id, &mut ride)
        }
    }

    /// Abort an in-flight dispatch, withdrawing any pending offer.
    pub fn cancel_dispatch(&self, ride_id: &RideId) -> Result<DispatchOutcome, DispatchError> {
        let Some(slot) = self.ride_slot(ride_id) else {
            return Err(DispatchError::UnknownRide(ride_id.clone()));
        };
        let mut ride = lock_ride(&slot);
        if ride.state.is_terminal() {
            return Err(DispatchError::UnknownRide(ride_id.clone()));
        }

        if let Err(err) = self.withdraw(ride_id, &mut ride) {
            warn!(ride_id = %ride_id, error = %err, "cancel failed on store error");
            self.abandon(ride_id, &mut ride);
            return Err(err);
        }
        self.ports.events.publish(DispatchEvent::RideStatus {
            ride_id: ride_id.clone(),
            status: RideStatus::Cancelled,
            driver_id: None,
        });
        info!(ride_id = %ride_id, "dispatch cancelled");
        Ok(DispatchOutcome::Aborted {
            ride_id: ride_id.clone(),
        })
    }

    /// Advance every active ride whose offer timed out without an answer.
    pub fn sweep_expired(&self) -> Result<SweepReport, DispatchError> {
        let mut report = SweepReport::default();
        for ride_id in self.ports.active.members()? {
            report.rides_checked += 1;
            match self.sweep_ride(&ride_id, &mut report) {
                Ok(()) => {}
                Err(err) => {
                    report.failures += 1;
                    warn!(ride_id = %ride_id, error = %err, "sweep could not advance ride");
                }
            }
        }
        report.locks_purged = self.ports.locks.purge_expired()?;
        if !report.is_idle() {
            info!(
                checked = report.rides_checked,
                expired = report.offers_expired,
                exhausted = report.exhausted,
                stalled = report.stalled_cleared,
                resumed = report.resumed,
                failures = report.failures,
                "dispatch sweep"
            );
        }
        Ok(report)
    }

    /// Current state of an in-flight dispatch.
    pub fn state(&self, ride_id: &RideId) -> Option<DispatchState> {
        let slot = self.ride_slot(ride_id)?;
        let state = lock_ride(&slot).state.clone();
        Some(state)
    }

    pub fn in_flight(&self) -> usize {
        self.rides_map().len()
    }

    // ── Transitions ────────────────────────────────────────────────────

    fn search(
        &self,
        ride_id: &RideId,
        ride: &mut RideDispatch,
        radius_km: f64,
    ) -> Result<DispatchOutcome, DispatchError> {
        ride.state = DispatchState::Searching;
        self.ports.events.publish(DispatchEvent::RideStatus {
            ride_id: ride_id.clone(),
            status: RideStatus::Searching,
            driver_id: None,
        });

        let nearby = self
            .ports
            .presence
            .query_nearby(ride.pickup, radius_km, self.config.nearby_limit)?;
        if nearby.is_empty() {
            return self.exhaust(ride_id, ride, ExhaustionReason::NoDriversNearby);
        }

        debug!(ride_id = %ride_id, candidates = nearby.len(), "candidate queue built");
        let candidates = nearby.into_iter().map(|n| n.driver_id).collect();
        let queue_ttl = self.config.queue_ttl();
        self.ports.queue.push(ride_id, candidates, queue_ttl)?;
        ride.queue_expires_at_ms = self.clock.deadline_after(queue_ttl);
        ride.state = DispatchState::Offering;
        self.offer_next(ride_id, ride)
    }

    /// Offer the ride to the next claimable candidate, or exhaust it.
    fn offer_next(
        &self,
        ride_id: &RideId,
        ride: &mut RideDispatch,
    ) -> Result<DispatchOutcome, DispatchError> {
        debug_assert_eq!(ride.state, DispatchState::Offering);
        let locks = &self.ports.locks;
        loop {
            let Some(driver_id) = self.ports.queue.pop_next(ride_id)? else {
                let reason = if self.clock.now_ms() >= ride.queue_expires_at_ms {
                    ExhaustionReason::QueueExpired
                } else {
                    ExhaustionReason::NoDriverAccepted
                };
                return self.exhaust(ride_id, ride, reason);
            };

            // The queue is a snapshot; skip anyone who went offline since.
            if !self.ports.presence.is_available(&driver_id)?
                || !self.ports.presence.is_alive(&driver_id)?
            {
                debug!(ride_id = %ride_id, driver_id = %driver_id, "candidate no longer dispatchable");
                continue;
            }
            if !locks.try_lock_driver(&driver_id, ride_id, self.config.driver_lock_ttl())? {
                debug!(ride_id = %ride_id, driver_id = %driver_id, "candidate claimed by another ride");
                continue;
            }
            if !locks.try_offer(ride_id, &driver_id, self.config.offer_ttl())? {
                locks.unlock_driver(&driver_id, ride_id)?;
                warn!(ride_id = %ride_id, driver_id = %driver_id, "ride already has a pending offer");
                continue;
            }

            let expires_at_ms = match locks.pending_offer(ride_id)? {
                Some(offer) => offer.expires_at_ms,
                None => self.clock.deadline_after(self.config.offer_ttl()),
            };
            ride.offers_made += 1;
            ride.state = DispatchState::AwaitingResponse {
                driver_id: driver_id.clone(),
                expires_at_ms,
            };
            self.ports.events.publish(DispatchEvent::OfferExtended {
                ride_id: ride_id.clone(),
                driver_id: driver_id.clone(),
                pickup: ride.pickup,
                expires_at_ms,
            });
            info!(
                ride_id = %ride_id,
                driver_id = %driver_id,
                attempt = ride.offers_made,
                expires_at_ms,
                "offer extended"
            );
            return Ok(DispatchOutcome::Offered {
                ride_id: ride_id.clone(),
                driver_id,
                expires_at_ms,
            });
        }
    }

    fn withdraw(&self, ride_id: &RideId, ride: &mut RideDispatch) -> Result<(), DispatchError> {
        if let Some(driver_id) = ride.state.awaiting().cloned() {
            self.release_offer(ride_id, &driver_id)?;
            self.ports.events.publish(DispatchEvent::OfferExpired {
                ride_id: ride_id.clone(),
                driver_id,
            });
        }
        self.ports.queue.clear(ride_id)?;
        self.retire(ride_id, ride, DispatchState::Aborted)?;
        Ok(())
    }

    /// Treat the pending offer as an implicit rejection and move on.
    fn expire_offer(
        &self,
        ride_id: &RideId,
        ride: &mut RideDispatch,
    ) -> Result<DispatchOutcome, DispatchError> {
        if let Some(driver_id) = ride.state.awaiting().cloned() {
            self.release_offer(ride_id, &driver_id)?;
            self.ports.events.publish(DispatchEvent::OfferExpired {
                ride_id: ride_id.clone(),
                driver_id: driver_id.clone(),
            });
            info!(ride_id = %ride_id, driver_id = %driver_id, "offer timed out");
        }
        ride.state = DispatchState::Offering;
        self.offer_next(ride_id, ride)
    }

    fn finalize_assignment(
        &self,
        ride_id: &RideId,
        driver_id: &DriverId,
        ride: &mut RideDispatch,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.ports.queue.clear(ride_id)?;
        if !self.ports.assignments.assign(ride_id, driver_id)? {
            let assigned = self.ports.assignments.assigned_driver(ride_id)?;
            self.retire(ride_id, ride, DispatchState::Aborted)?;
            return Err(DispatchError::AlreadyAssigned {
                ride_id: ride_id.clone(),
                driver_id: assigned.unwrap_or_else(|| driver_id.clone()),
            });
        }
        self.retire(
            ride_id,
            ride,
            DispatchState::Accepted {
                driver_id: driver_id.clone(),
            },
        )?;
        self.ports.events.publish(DispatchEvent::RideStatus {
            ride_id: ride_id.clone(),
            status: RideStatus::Assigned,
            driver_id: Some(driver_id.clone()),
        });
        info!(ride_id = %ride_id, driver_id = %driver_id, attempts = ride.offers_made, "ride assigned");
        Ok(DispatchOutcome::Assigned {
            ride_id: ride_id.clone(),
            driver_id: driver_id.clone(),
        })
    }

    fn exhaust(
        &self,
        ride_id: &RideId,
        ride: &mut RideDispatch,
        reason: ExhaustionReason,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.ports.queue.clear(ride_id)?;
        self.retire(ride_id, ride, DispatchState::Exhausted { reason })?;
        self.ports.events.publish(DispatchEvent::DispatchFailed {
            ride_id: ride_id.clone(),
            reason,
        });
        info!(ride_id = %ride_id, ?reason, attempts = ride.offers_made, "dispatch exhausted");
        Ok(DispatchOutcome::Exhausted {
            ride_id: ride_id.clone(),
            reason,
        })
    }

    fn sweep_ride(&self, ride_id: &RideId, report: &mut SweepReport) -> Result<(), DispatchError> {
        let slot = {
            // Under the map lock a ride is either registered, retired, or owned by nobody.
            let rides = self.rides_map();
            let slot = rides.get(ride_id).map(|entry| entry.slot.clone());
            if slot.is_none() && !self.ports.active.contains(ride_id)? {
                return Ok(());
            }
            slot
        };
        let Some(slot) = slot else {
            return self.clear_orphan(ride_id, report);
        };

        let mut ride = lock_ride(&slot);
        match ride.state.clone() {
            DispatchState::AwaitingResponse { driver_id, .. } => {
                if self.ports.locks.get_offer(ride_id)?.as_ref() == Some(&driver_id) {
                    return Ok(());
                }
                report.offers_expired += 1;
                let outcome = self.expire_offer(ride_id, &mut ride)?;
                report.record(&outcome);
            }
            DispatchState::Idle | DispatchState::Searching | DispatchState::Offering => {
                // A store error cut a transition short; pick up from the queue.
                warn!(ride_id = %ride_id, state = ?ride.state, "resuming interrupted dispatch");
                report.resumed += 1;
                ride.state = DispatchState::Offering;
                let outcome = self.offer_next(ride_id, &mut ride)?;
                report.record(&outcome);
            }
            DispatchState::Accepted { .. } | DispatchState::Exhausted { .. } | DispatchState::Aborted => {}
        }
        Ok(())
    }

    /// Marked active but owned by nobody: a dispatcher died mid-flight, or a
    /// retire could not reach the active set.
    fn clear_orphan(&self, ride_id: &RideId, report: &mut SweepReport) -> Result<(), DispatchError> {
        if self.ports.assignments.assigned_driver(ride_id)?.is_some() {
            self.ports.active.remove(ride_id)?;
            debug!(ride_id = %ride_id, "dropped active entry of an assigned ride");
            return Ok(());
        }
        if self.ports.locks.get_offer(ride_id)?.is_some() || self.ports.queue.remaining(ride_id)? > 0 {
            return Ok(());
        }
        self.ports.active.remove(ride_id)?;
        self.ports.events.publish(DispatchEvent::DispatchFailed {
            ride_id: ride_id.clone(),
            reason: ExhaustionReason::Stalled,
        });
        warn!(ride_id = %ride_id, "cleared stalled dispatch");
        report.stalled_cleared += 1;
        Ok(())
    }

    // ── Bookkeeping ────────────────────────────────────────────────────

    fn release_offer(&self, ride_id: &RideId, driver_id: &DriverId) -> Result<(), StoreError> {
        self.ports.locks.clear_offer(ride_id)?;
        self.ports.locks.unlock_driver(driver_id, ride_id)
    }

    /// Move to a terminal state and drop the ride from every in-flight index.
    ///
    /// The active set goes first, so a ride missing from the map while still
    /// active is never one that is mid-retire.
    fn retire(
        &self,
        ride_id: &RideId,
        ride: &mut RideDispatch,
        terminal: DispatchState,
    ) -> Result<(), StoreError> {
        debug_assert!(terminal.is_terminal());
        ride.state = terminal;
        let removed = self.ports.active.remove(ride_id);
        let mut rides = self.rides_map();
        if rides
            .get(ride_id)
            .is_some_and(|entry| entry.generation == ride.generation)
        {
            rides.remove(ride_id);
        }
        removed
    }

    /// Best-effort cleanup after a store failure left a dispatch half-built.
    fn abandon(&self, ride_id: &RideId, ride: &mut RideDispatch) {
        if let Some(driver_id) = ride.state.awaiting().cloned() {
            if let Err(err) = self.release_offer(ride_id, &driver_id) {
                warn!(ride_id = %ride_id, error = %err, "could not release offer");
            }
        }
        if let Err(err) = self.ports.queue.clear(ride_id) {
            warn!(ride_id = %ride_id, error = %err, "could not clear candidate queue");
        }
        if let Err(err) = self.retire(ride_id, ride, DispatchState::Aborted) {
            warn!(ride_id = %ride_id, error = %err, "could not clear active dispatch");
        }
    }

    fn ride_slot(&self, ride_id: &RideId) -> Option<RideSlot> {
        self.rides_map().get(ride_id).map(|entry| entry.slot.clone())
    }

    fn rides_map(&self) -> MutexGuard<'_, HashMap<RideId, RideEntry>> {
        self.rides.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock_ride(slot: &RideSlot) -> MutexGuard<'_, RideDispatch> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_resting_states_are_terminal() {
        let driver_id = DriverId::new("D1");
        assert!(!DispatchState::Searching.is_terminal());
        assert!(!DispatchState::AwaitingResponse {
            driver_id: driver_id.clone(),
            expires_at_ms: 0,
        }
        .is_terminal());
        assert!(DispatchState::Accepted { driver_id }.is_terminal());
        assert!(DispatchState::Exhausted {
            reason: ExhaustionReason::Stalled,
        }
        .is_terminal());
        assert!(DispatchState::Aborted.is_terminal());
    }

    #[test]
    fn state_serializes_with_a_tag() {
        let state = DispatchState::AwaitingResponse {
            driver_id: DriverId::new("D1"),
            expires_at_ms: 5,
        };
        let json = serde_json::to_value(&state).expect("serialize");
        assert_eq!(json["state"], "awaiting_response");
        assert_eq!(json["driver_id"], "D1");
    }

    #[test]
    fn sweep_report_counts_follow_up_outcomes() {
        let mut report = SweepReport::default();
        assert!(report.is_idle());
        report.offers_expired += 1;
        report.record(&DispatchOutcome::Offered {
            ride_id: RideId::new("R1"),
            driver_id: DriverId::new("D2"),
            expires_at_ms: 0,
        });
        report.record(&DispatchOutcome::Exhausted {
            ride_id: RideId::new("R2"),
            reason: ExhaustionReason::NoDriverAccepted,
        });
        assert_eq!((report.reoffered, report.exhausted), (1, 1));
        assert!(!report.is_idle());
    }
}
