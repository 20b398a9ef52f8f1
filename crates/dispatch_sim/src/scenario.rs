//! Scenario parameters for a simulated dispatch run.

use dispatch_core::geo::GeoPoint;

/// Default service area centre: the Ridge, Shimla.
const DEFAULT_CENTER: GeoPoint = GeoPoint {
    lng: 77.1734,
    lat: 31.1048,
};

/// Rough degrees-per-km at mid latitudes; good enough for scattering agents.
const KM_PER_DEG_LAT: f64 = 111.0;

#[derive(Debug, Clone)]
pub struct ScenarioParams {
    pub num_drivers: usize,
    pub num_rides: usize,
    pub seed: u64,
    pub center: GeoPoint,
    /// Drivers and pickups are placed uniformly within this many km of the centre.
    pub spread_km: f64,
    /// Ride requests arrive uniformly over this window.
    pub request_window_secs: u64,
    /// Drivers refresh their heartbeat this often.
    pub heartbeat_interval_secs: u64,
    /// Probability that a driver never answers an offer.
    pub silent_probability: f64,
    /// Logit score before the pickup-distance penalty.
    pub base_acceptance_score: f64,
    /// Score penalty per km between driver and pickup.
    pub pickup_distance_penalty: f64,
    /// Drivers answer uniformly within this many seconds (may exceed the offer TTL).
    pub max_response_delay_secs: u64,
    /// How long an assigned driver is busy before becoming available again.
    pub trip_duration_secs: u64,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            num_drivers: 50,
            num_rides: 200,
            seed: 42,
            center: DEFAULT_CENTER,
            spread_km: 8.0,
            request_window_secs: 30 * 60,
            heartbeat_interval_secs: 10,
            silent_probability: 0.1,
            base_acceptance_score: 1.5,
            pickup_distance_penalty: -0.3,
            max_response_delay_secs: 25,
            trip_duration_secs: 15 * 60,
        }
    }
}

impl ScenarioParams {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_fleet(mut self, drivers: usize, rides: usize) -> Self {
        self.num_drivers = drivers;
        self.num_rides = rides;
        self
    }

    pub fn with_request_window_mins(mut self, mins: u64) -> Self {
        self.request_window_secs = mins * 60;
        self
    }

    pub fn with_silent_probability(mut self, probability: f64) -> Self {
        self.silent_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Offset from the centre by `(east_km, north_km)`.
    pub fn offset(&self, east_km: f64, north_km: f64) -> GeoPoint {
        let km_per_deg_lng = KM_PER_DEG_LAT * self.center.lat.to_radians().cos();
        GeoPoint::new(
            self.center.lng + east_km / km_per_deg_lng,
            self.center.lat + north_km / KM_PER_DEG_LAT,
        )
    }

    /// Acceptance probability for a pickup `distance_km` away.
    pub fn acceptance_probability(&self, distance_km: f64) -> f64 {
        let score = self.base_acceptance_score + distance_km * self.pickup_distance_penalty;
        1.0 / (1.0 + (-score).exp())
    }
}
