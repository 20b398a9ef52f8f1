//! Simulation runner: advances a manual clock one second at a time and plays
//! the drivers and riders against an in-memory dispatcher.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use anyhow::{Context, Result};
use dispatch_core::clock::{ManualClock, ONE_SEC_MS};
use dispatch_core::events::{ChannelPublisher, DispatchEvent, RideStatus};
use dispatch_core::geo::{haversine_km, GeoPoint};
use dispatch_core::{DispatchConfig, DispatchError, Dispatcher, DriverId, RideId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::scenario::ScenarioParams;
use crate::summary::RunSummary;

/// Arbitrary fixed epoch so runs are reproducible.
const SIM_START_MS: u64 = 1_700_000_000_000;

/// Extra simulated time after the last request so every dispatch can settle.
const DRAIN_SECS: u64 = 10 * 60;

#[derive(Debug)]
struct SimDriver {
    id: DriverId,
    position: GeoPoint,
    busy_until_secs: Option<u64>,
}

#[derive(Debug)]
struct SimRide {
    id: RideId,
    pickup: GeoPoint,
    request_at_secs: u64,
    /// The rider cancels if still unmatched this long after requesting.
    patience_secs: u64,
    resolved: bool,
}

#[derive(Debug)]
struct PendingResponse {
    due_secs: u64,
    ride_id: RideId,
    driver_id: DriverId,
    accept: bool,
}

pub struct Simulation {
    params: ScenarioParams,
    config: DispatchConfig,
    clock: Arc<ManualClock>,
    dispatcher: Dispatcher,
    events: Receiver<DispatchEvent>,
    rng: StdRng,
    drivers: Vec<SimDriver>,
    driver_slots: HashMap<DriverId, usize>,
    rides: Vec<SimRide>,
    ride_slots: HashMap<RideId, usize>,
    responses: Vec<PendingResponse>,
    now_secs: u64,
    summary: RunSummary,
}

impl Simulation {
    pub fn new(params: ScenarioParams, config: DispatchConfig) -> Self {
        let clock = Arc::new(ManualClock::new(SIM_START_MS));
        let (sender, events) = mpsc::channel();
        let dispatcher = Dispatcher::in_memory(
            config.clone(),
            clock.clone(),
            Arc::new(ChannelPublisher::new(sender)),
        );
        let mut rng = StdRng::seed_from_u64(params.seed);

        let drivers: Vec<SimDriver> = (0..params.num_drivers)
            .map(|i| SimDriver {
                id: DriverId::new(format!("driver-{i}")),
                position: random_point(&params, &mut rng),
                busy_until_secs: None,
            })
            .collect();
        let mut rides: Vec<SimRide> = (0..params.num_rides)
            .map(|i| SimRide {
                id: RideId::new(format!("ride-{i}")),
                pickup: random_point(&params, &mut rng),
                request_at_secs: rng.gen_range(0..params.request_window_secs.max(1)),
                patience_secs: rng.gen_range(30..=180),
                resolved: false,
            })
            .collect();
        rides.sort_by_key(|ride| ride.request_at_secs);

        let driver_slots = drivers.iter().enumerate().map(|(i, d)| (d.id.clone(), i)).collect();
        let ride_slots = rides.iter().enumerate().map(|(i, r)| (r.id.clone(), i)).collect();
        let summary = RunSummary::new(params.seed, params.num_drivers, params.num_rides);

        Self {
            params,
            config,
            clock,
            dispatcher,
            events,
            rng,
            drivers,
            driver_slots,
            rides,
            ride_slots,
            responses: Vec::new(),
            now_secs: 0,
            summary,
        }
    }

    /// Run until every ride is resolved or the drain window closes.
    pub fn run(mut self) -> Result<RunSummary> {
        let last_request = self.rides.last().map_or(0, |r| r.request_at_secs);
        let horizon = last_request + DRAIN_SECS;
        let sweep_every = self.config.sweep_interval_secs.max(1);

        self.heartbeat_all()?;
        while self.now_secs <= horizon {
            self.release_finished_trips()?;
            if self.now_secs % self.params.heartbeat_interval_secs.max(1) == 0 {
                self.heartbeat_all()?;
            }
            self.request_due_rides()?;
            self.deliver_due_responses()?;
            self.cancel_impatient_rides()?;
            if self.now_secs % sweep_every == 0 {
                self.dispatcher.sweep_expired()?;
                self.summary.sweeps += 1;
                self.drain_events()?;
            }
            if self.summary.resolved() == self.rides.len() {
                break;
            }
            self.tick();
        }

        self.summary.simulated_secs = self.now_secs;
        info!(
            assigned = self.summary.assigned,
            exhausted = self.summary.exhausted(),
            aborted = self.summary.aborted,
            in_flight = self.dispatcher.in_flight(),
            "simulation finished"
        );
        Ok(self.summary)
    }

    fn tick(&mut self) {
        self.clock.advance_ms(ONE_SEC_MS);
        self.now_secs += 1;
    }

    fn heartbeat_all(&mut self) -> Result<()> {
        for driver in &self.drivers {
            self.dispatcher
                .update_location(&driver.id, driver.position)
                .with_context(|| format!("heartbeat for {}", driver.id))?;
        }
        Ok(())
    }

    fn release_finished_trips(&mut self) -> Result<()> {
        let now = self.now_secs;
        for i in 0..self.drivers.len() {
            if self.drivers[i].busy_until_secs.is_some_and(|until| until <= now) {
                self.drivers[i].busy_until_secs = None;
                self.drivers[i].position = random_point(&self.params, &mut self.rng);
                let driver = &self.drivers[i];
                self.dispatcher.update_location(&driver.id, driver.position)?;
                self.dispatcher.set_availability(&driver.id, true)?;
                debug!(driver_id = %driver.id, "driver back online");
            }
        }
        Ok(())
    }

    fn request_due_rides(&mut self) -> Result<()> {
        let now = self.now_secs;
        let due: Vec<(RideId, GeoPoint)> = self
            .rides
            .iter()
            .filter(|ride| ride.request_at_secs == now)
            .map(|ride| (ride.id.clone(), ride.pickup))
            .collect();
        for (ride_id, pickup) in due {
            self.dispatcher
                .start_dispatch(&ride_id, pickup, None)
                .with_context(|| format!("starting dispatch for {ride_id}"))?;
            self.drain_events()?;
        }
        Ok(())
    }

    fn deliver_due_responses(&mut self) -> Result<()> {
        let now = self.now_secs;
        let (due, later): (Vec<_>, Vec<_>) =
            self.responses.drain(..).partition(|r| r.due_secs <= now);
        self.responses = later;
        for response in due {
            match self
                .dispatcher
                .respond_to_offer(&response.ride_id, &response.driver_id, response.accept)
            {
                Ok(_) => {}
                Err(DispatchError::InvalidOffer { .. }) => self.summary.late_responses += 1,
                Err(err) => return Err(err).context("delivering driver response"),
            }
            self.drain_events()?;
        }
        Ok(())
    }

    fn cancel_impatient_rides(&mut self) -> Result<()> {
        let now = self.now_secs;
        let impatient: Vec<RideId> = self
            .rides
            .iter()
            .filter(|ride| !ride.resolved && ride.request_at_secs + ride.patience_secs == now)
            .map(|ride| ride.id.clone())
            .collect();
        for ride_id in impatient {
            if self.dispatcher.state(&ride_id).is_some_and(|s| !s.is_terminal()) {
                self.dispatcher.cancel_dispatch(&ride_id)?;
                self.drain_events()?;
            }
        }
        Ok(())
    }

    fn drain_events(&mut self) -> Result<()> {
        while let Ok(event) = self.events.try_recv() {
            self.apply_event(event)?;
        }
        Ok(())
    }

    fn apply_event(&mut self, event: DispatchEvent) -> Result<()> {
        match event {
            DispatchEvent::OfferExtended {
                ride_id,
                driver_id,
                pickup,
                ..
            } => {
                self.summary.offers_extended += 1;
                self.schedule_response(ride_id, driver_id, pickup);
            }
            DispatchEvent::OfferExpired { .. } => self.summary.offers_expired += 1,
            DispatchEvent::RideStatus {
                ride_id,
                status: RideStatus::Assigned,
                driver_id: Some(driver_id),
            } => {
                let now = self.now_secs;
                let waited = self
                    .resolve_ride(&ride_id)
                    .map_or(0, |ride| now.saturating_sub(ride.request_at_secs));
                self.summary.record_assignment(waited);
                self.start_trip(&driver_id, &ride_id)?;
            }
            DispatchEvent::RideStatus {
                ride_id,
                status: RideStatus::Cancelled,
                ..
            } => {
                self.resolve_ride(&ride_id);
                self.summary.aborted += 1;
            }
            DispatchEvent::RideStatus { .. } => {}
            DispatchEvent::DispatchFailed { ride_id, reason } => {
                self.resolve_ride(&ride_id);
                self.summary.record_exhaustion(reason);
            }
        }
        Ok(())
    }

    fn schedule_response(&mut self, ride_id: RideId, driver_id: DriverId, pickup: GeoPoint) {
        if self.rng.gen_bool(self.params.silent_probability) {
            debug!(ride_id = %ride_id, driver_id = %driver_id, "driver ignores offer");
            return;
        }
        let distance_km = self
            .driver_slots
            .get(&driver_id)
            .map_or(0.0, |&i| haversine_km(self.drivers[i].position, pickup));
        let accept = self
            .rng
            .gen_bool(self.params.acceptance_probability(distance_km));
        let delay = self.rng.gen_range(1..=self.params.max_response_delay_secs.max(1));
        self.responses.push(PendingResponse {
            due_secs: self.now_secs + delay,
            ride_id,
            driver_id,
            accept,
        });
    }

    fn start_trip(&mut self, driver_id: &DriverId, ride_id: &RideId) -> Result<()> {
        self.dispatcher.set_availability(driver_id, false)?;
        let Some(&i) = self.driver_slots.get(driver_id) else {
            return Ok(());
        };
        let pickup = self.ride_slots.get(ride_id).map(|&r| self.rides[r].pickup);
        let driver = &mut self.drivers[i];
        if let Some(pickup) = pickup {
            driver.position = pickup;
        }
        driver.busy_until_secs = Some(self.now_secs + self.params.trip_duration_secs);
        Ok(())
    }

    fn resolve_ride(&mut self, ride_id: &RideId) -> Option<&SimRide> {
        let &i = self.ride_slots.get(ride_id)?;
        let ride = &mut self.rides[i];
        ride.resolved = true;
        Some(ride)
    }
}

fn random_point(params: &ScenarioParams, rng: &mut StdRng) -> GeoPoint {
    let east = rng.gen_range(-params.spread_km..=params.spread_km);
    let north = rng.gen_range(-params.spread_km..=params.spread_km);
    params.offset(east, north)
}
