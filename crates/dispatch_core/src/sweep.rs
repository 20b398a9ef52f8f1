//! Background task that keeps dispatches moving when drivers go silent.
//!
//! Offer expiry is not an event in any of the stores, so without a periodic
//! pass a ride whose driver never answers would wait forever.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{self, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::dispatcher::Dispatcher;

/// Run [`Dispatcher::sweep_expired`] every `every` until `shutdown` flips to
/// `true` or its sender is dropped.
pub fn spawn_sweeper(
    dispatcher: Arc<Dispatcher>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // The stores take blocking locks; keep them off the async workers.
                    let sweeping = dispatcher.clone();
                    match task::spawn_blocking(move || sweeping.sweep_expired()).await {
                        Ok(Ok(report)) => debug!(checked = report.rides_checked, expired = report.offers_expired, "sweep tick"),
                        Ok(Err(err)) => warn!(error = %err, "dispatch sweep failed"),
                        Err(err) => warn!(error = %err, "dispatch sweep task did not complete"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("dispatch sweeper stopping");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::DispatchConfig;
    use crate::dispatcher::{DispatchOutcome, DispatchState};
    use crate::events::RecordingPublisher;
    use crate::geo::GeoPoint;
    use crate::types::{DriverId, RideId};

    #[tokio::test(start_paused = true)]
    async fn sweeper_advances_a_silent_offer_and_stops_on_shutdown() {
        let clock = Arc::new(ManualClock::new(0));
        let events = Arc::new(RecordingPublisher::new());
        let dispatcher = Arc::new(Dispatcher::in_memory(
            DispatchConfig::default(),
            clock.clone(),
            events.clone(),
        ));
        for (id, lng) in [("D1", 77.1735), ("D2", 77.1800)] {
            let driver = DriverId::from(id);
            dispatcher
                .update_location(&driver, GeoPoint::new(lng, 31.1048))
                .expect("location");
            dispatcher.set_availability(&driver, true).expect("availability");
        }

        let ride = RideId::from("ride1");
        let outcome = dispatcher
            .start_dispatch(&ride, GeoPoint::new(77.1734, 31.1048), None)
            .expect("dispatch");
        assert!(matches!(outcome, DispatchOutcome::Offered { ref driver_id, .. } if driver_id.as_str() == "D1"));

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_sweeper(dispatcher.clone(), Duration::from_secs(2), stop_rx);

        // D1 stays silent past the offer TTL; heartbeats keep D2 alive.
        clock.advance_secs(21);
        dispatcher
            .update_location(&DriverId::from("D2"), GeoPoint::new(77.1800, 31.1048))
            .expect("heartbeat");
        tokio::time::sleep(Duration::from_secs(3)).await;
        for _ in 0..10 {
            if events.names().contains(&"ride:offer-expired") {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        match dispatcher.state(&ride) {
            Some(DispatchState::AwaitingResponse { driver_id, .. }) => assert_eq!(driver_id.as_str(), "D2"),
            other => panic!("expected offer to D2, got {other:?}"),
        }
        assert!(events.names().contains(&"ride:offer-expired"));

        stop_tx.send(true).expect("send shutdown");
        handle.await.expect("sweeper joins");
    }
}
