//! Outbound notifications for the rider and driver real-time channels.
//!
//! Transport is someone else's problem: a publisher receives fully formed
//! [`DispatchEvent`]s and is expected not to block. Publishing never fails a
//! dispatch transition; publishers log their own delivery failures.

use std::sync::mpsc::Sender;
use std::sync::Mutex;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::geo::GeoPoint;
use crate::types::{DriverId, RideId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    Searching,
    Assigned,
    Cancelled,
}

/// Why a dispatch ended without an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionReason {
    /// The nearby search found no dispatchable driver.
    NoDriversNearby,
    /// Every queued candidate declined, timed out or was claimed elsewhere.
    NoDriverAccepted,
    /// The candidate queue lapsed before anyone accepted.
    QueueExpired,
    /// The ride was still marked active but no dispatcher owned it.
    Stalled,
}

/// Channel a notification is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Rider(RideId),
    Driver(DriverId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    OfferExtended {
        ride_id: RideId,
        driver_id: DriverId,
        pickup: GeoPoint,
        expires_at_ms: u64,
    },
    /// The driver's offer was withdrawn: timed out or the ride was cancelled.
    OfferExpired { ride_id: RideId, driver_id: DriverId },
    RideStatus {
        ride_id: RideId,
        status: RideStatus,
        driver_id: Option<DriverId>,
    },
    DispatchFailed {
        ride_id: RideId,
        reason: ExhaustionReason,
    },
}

impl DispatchEvent {
    /// Wire name on the real-time channel.
    pub fn name(&self) -> &'static str {
        match self {
            DispatchEvent::OfferExtended { .. } => "ride:offer",
            DispatchEvent::OfferExpired { .. } => "ride:offer-expired",
            DispatchEvent::RideStatus { .. } => "ride:status",
            DispatchEvent::DispatchFailed { .. } => "dispatch:failed",
        }
    }

    pub fn ride_id(&self) -> &RideId {
        match self {
            DispatchEvent::OfferExtended { ride_id, .. }
            | DispatchEvent::OfferExpired { ride_id, .. }
            | DispatchEvent::RideStatus { ride_id, .. }
            | DispatchEvent::DispatchFailed { ride_id, .. } => ride_id,
        }
    }

    pub fn recipient(&self) -> Recipient {
        match self {
            DispatchEvent::OfferExtended { driver_id, .. }
            | DispatchEvent::OfferExpired { driver_id, .. } => Recipient::Driver(driver_id.clone()),
            DispatchEvent::RideStatus { ride_id, .. }
            | DispatchEvent::DispatchFailed { ride_id, .. } => Recipient::Rider(ride_id.clone()),
        }
    }

    /// JSON payload in the shape the client apps already consume.
    pub fn payload(&self) -> Value {
        match self {
            DispatchEvent::OfferExtended {
                ride_id,
                driver_id,
                pickup,
                expires_at_ms,
            } => json!({
                "rideId": ride_id,
                "driverId": driver_id,
                "pickup": { "lng": pickup.lng, "lat": pickup.lat },
                "expiresAt": expires_at_ms,
            }),
            DispatchEvent::OfferExpired { ride_id, driver_id } => json!({
                "rideId": ride_id,
                "driverId": driver_id,
            }),
            DispatchEvent::RideStatus {
                ride_id,
                status,
                driver_id,
            } => {
                let mut payload = json!({ "rideId": ride_id, "status": status });
                if let Some(driver_id) = driver_id {
                    payload["driverId"] = json!(driver_id);
                }
                payload
            }
            DispatchEvent::DispatchFailed { ride_id, reason } => json!({
                "rideId": ride_id,
                "reason": reason,
            }),
        }
    }
}

pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DispatchEvent);
}

/// Writes every event to the log. Default for deployments without a channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPublisher;

impl EventPublisher for TracingPublisher {
    fn publish(&self, event: DispatchEvent) {
        info!(
            event = event.name(),
            ride_id = %event.ride_id(),
            payload = %event.payload(),
            "dispatch event"
        );
    }
}

/// Keeps every event in memory, in publish order.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DispatchEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(DispatchEvent::name).collect()
    }

    pub fn take(&self) -> Vec<DispatchEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: DispatchEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Forwards events to a consumer thread.
#[derive(Debug)]
pub struct ChannelPublisher {
    sender: Mutex<Sender<DispatchEvent>>,
}

impl ChannelPublisher {
    pub fn new(sender: Sender<DispatchEvent>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(&self, event: DispatchEvent) {
        let name = event.name();
        let sent = match self.sender.lock() {
            Ok(sender) => sender.send(event).is_ok(),
            Err(_) => false,
        };
        if !sent {
            warn!(event = name, "event channel closed; dropping dispatch event");
        }
    }
}
