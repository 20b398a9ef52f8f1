use dispatch_core::dispatcher::DispatchOutcome;
use dispatch_core::test_helpers::TestHarness;
use dispatch_core::{DriverId, RideId};

/// The ride holds no offer and no driver lock, and is no longer active.
pub fn assert_ride_released(harness: &TestHarness, ride: &RideId, drivers: &[DriverId]) {
    let ports = harness.dispatcher.ports();
    assert_eq!(
        ports.locks.get_offer(ride).expect("offer lookup"),
        None,
        "ride {ride} still has a pending offer"
    );
    for driver in drivers {
        assert_ne!(
            ports.locks.driver_lock_holder(driver).expect("lock lookup").as_ref(),
            Some(ride),
            "driver {driver} still locked by ride {ride}"
        );
    }
    assert!(
        !ports.active.contains(ride).expect("active lookup"),
        "ride {ride} still in the active set"
    );
    assert!(harness.dispatcher.state(ride).is_none());
}

/// Driver an `Offered` outcome went to.
pub fn offered_driver(outcome: &DispatchOutcome) -> &DriverId {
    match outcome {
        DispatchOutcome::Offered { driver_id, .. } => driver_id,
        other => panic!("expected an offer, got {other:?}"),
    }
}
