//! Test helpers for common dispatch setup.
//!
//! Shared by unit tests, the scenario tests under `tests/` and the benches.

use std::sync::Arc;

use crate::clock::ManualClock;
use crate::config::DispatchConfig;
use crate::dispatcher::Dispatcher;
use crate::events::RecordingPublisher;
use crate::geo::GeoPoint;
use crate::types::DriverId;

/// Pickup point on the Ridge, Shimla.
pub const TEST_PICKUP: GeoPoint = GeoPoint {
    lng: 77.1734,
    lat: 31.1048,
};

/// Arbitrary non-zero start so "no heartbeat yet" never looks like time zero.
pub const TEST_START_MS: u64 = 1_700_000_000_000;

/// A dispatcher over in-memory stores with a hand-driven clock and an event recorder.
pub struct TestHarness {
    pub clock: Arc<ManualClock>,
    pub events: Arc<RecordingPublisher>,
    pub dispatcher: Dispatcher,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(DispatchConfig::default())
    }

    pub fn with_config(config: DispatchConfig) -> Self {
        let clock = Arc::new(ManualClock::new(TEST_START_MS));
        let events = Arc::new(RecordingPublisher::new());
        let dispatcher = Dispatcher::in_memory(config, clock.clone(), events.clone());
        Self {
            clock,
            events,
            dispatcher,
        }
    }

    /// Heartbeat plus availability: the driver becomes dispatchable.
    pub fn online_driver(&self, id: &str, lng: f64, lat: f64) -> DriverId {
        let driver = DriverId::from(id);
        self.dispatcher
            .update_location(&driver, GeoPoint::new(lng, lat))
            .expect("driver location should be valid");
        self.dispatcher
            .set_availability(&driver, true)
            .expect("availability update should succeed");
        driver
    }

    /// `count` drivers roughly 95 m apart heading east from the test pickup.
    pub fn online_fleet(&self, count: usize) -> Vec<DriverId> {
        (0..count)
            .map(|i| {
                self.online_driver(
                    &format!("D{}", i + 1),
                    TEST_PICKUP.lng + 0.001 * (i as f64 + 1.0),
                    TEST_PICKUP.lat,
                )
            })
            .collect()
    }

    /// Refresh heartbeats without moving anyone.
    pub fn heartbeat(&self, drivers: &[DriverId]) {
        for driver in drivers {
            let presence = self
                .dispatcher
                .ports()
                .presence
                .presence(driver)
                .expect("presence lookup")
                .and_then(|p| p.position)
                .expect("driver should have a position");
            self.dispatcher
                .update_location(driver, presence)
                .expect("heartbeat");
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
