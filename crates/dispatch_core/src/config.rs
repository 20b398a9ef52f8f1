//! Dispatch tunables.
//!
//! Every TTL and search limit lives here so deployments can adjust them
//! from a TOML document without code changes. Missing keys fall back to the
//! defaults below.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_HEARTBEAT_TTL_SECS: u64 = 30;
const DEFAULT_DRIVER_LOCK_TTL_SECS: u64 = 25;
const DEFAULT_OFFER_TTL_SECS: u64 = 20;
const DEFAULT_QUEUE_TTL_SECS: u64 = 60;
const DEFAULT_RADIUS_KM: f64 = 10.0;
const DEFAULT_NEARBY_LIMIT: usize = 10;
const DEFAULT_OVERFETCH_MULTIPLIER: usize = 3;
/// H3 resolution 7: ~1.4 km hexagon edge, a few hundred cells for a 10 km search.
const DEFAULT_GEO_RESOLUTION: u8 = 7;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// A driver without a heartbeat for this long is treated as offline.
    pub heartbeat_ttl_secs: u64,
    /// Lifetime of the per-driver claim taken while an offer is outstanding.
    pub driver_lock_ttl_secs: u64,
    /// How long a driver has to answer an offer.
    pub offer_ttl_secs: u64,
    /// Lifetime of a ride's candidate queue; bounds total dispatch time.
    pub queue_ttl_secs: u64,
    /// Search radius used when a dispatch request does not name one.
    pub default_radius_km: f64,
    /// Maximum number of candidates queued per dispatch.
    pub nearby_limit: usize,
    /// Geo-index over-fetch factor applied before availability filtering.
    pub overfetch_multiplier: usize,
    pub geo_resolution: u8,
    pub sweep_interval_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            heartbeat_ttl_secs: DEFAULT_HEARTBEAT_TTL_SECS,
            driver_lock_ttl_secs: DEFAULT_DRIVER_LOCK_TTL_SECS,
            offer_ttl_secs: DEFAULT_OFFER_TTL_SECS,
            queue_ttl_secs: DEFAULT_QUEUE_TTL_SECS,
            default_radius_km: DEFAULT_RADIUS_KM,
            nearby_limit: DEFAULT_NEARBY_LIMIT,
            overfetch_multiplier: DEFAULT_OVERFETCH_MULTIPLIER,
            geo_resolution: DEFAULT_GEO_RESOLUTION,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl DispatchConfig {
    /// Parse and validate a (possibly partial) TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("heartbeat_ttl_secs", self.heartbeat_ttl_secs),
            ("driver_lock_ttl_secs", self.driver_lock_ttl_secs),
            ("offer_ttl_secs", self.offer_ttl_secs),
            ("queue_ttl_secs", self.queue_ttl_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }
        if self.driver_lock_ttl_secs < self.offer_ttl_secs {
            return Err(invalid(
                "driver_lock_ttl_secs",
                format!(
                    "{} is shorter than offer_ttl_secs ({}); the driver lock must outlive the offer",
                    self.driver_lock_ttl_secs, self.offer_ttl_secs
                ),
            ));
        }
        if !self.default_radius_km.is_finite() || self.default_radius_km <= 0.0 {
            return Err(invalid("default_radius_km", "must be finite and positive"));
        }
        if self.nearby_limit == 0 {
            return Err(invalid("nearby_limit", "must be greater than zero"));
        }
        if self.overfetch_multiplier == 0 {
            return Err(invalid("overfetch_multiplier", "must be at least 1"));
        }
        if self.geo_resolution > 15 {
            return Err(invalid("geo_resolution", "H3 resolutions range from 0 to 15"));
        }
        Ok(())
    }

    pub fn heartbeat_ttl(&self) -> Duration {
        Duration::from_secs(self.heartbeat_ttl_secs)
    }

    pub fn driver_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.driver_lock_ttl_secs)
    }

    pub fn offer_ttl(&self) -> Duration {
        Duration::from_secs(self.offer_ttl_secs)
    }

    pub fn queue_ttl(&self) -> Duration {
        Duration::from_secs(self.queue_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn with_heartbeat_ttl_secs(mut self, secs: u64) -> Self {
        self.heartbeat_ttl_secs = secs;
        self
    }

    pub fn with_offer_ttl_secs(mut self, secs: u64) -> Self {
        self.offer_ttl_secs = secs;
        self
    }

    pub fn with_driver_lock_ttl_secs(mut self, secs: u64) -> Self {
        self.driver_lock_ttl_secs = secs;
        self
    }

    pub fn with_queue_ttl_secs(mut self, secs: u64) -> Self {
        self.queue_ttl_secs = secs;
        self
    }

    pub fn with_nearby_limit(mut self, limit: usize) -> Self {
        self.nearby_limit = limit;
        self
    }

    pub fn with_default_radius_km(mut self, radius_km: f64) -> Self {
        self.default_radius_km = radius_km;
        self
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_timings() {
        let config = DispatchConfig::default();
        assert_eq!(config.heartbeat_ttl(), Duration::from_secs(30));
        assert_eq!(config.driver_lock_ttl(), Duration::from_secs(25));
        assert_eq!(config.offer_ttl(), Duration::from_secs(20));
        assert_eq!(config.queue_ttl(), Duration::from_secs(60));
        assert_eq!(config.default_radius_km, 10.0);
        assert_eq!(config.overfetch_multiplier, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config = DispatchConfig::from_toml_str(
            r#"
            offer_ttl_secs = 15
            nearby_limit = 5
            "#,
        )
        .expect("valid config");

        assert_eq!(config.offer_ttl_secs, 15);
        assert_eq!(config.nearby_limit, 5);
        assert_eq!(config.queue_ttl_secs, 60);
    }

    #[test]
    fn driver_lock_shorter_than_offer_is_rejected() {
        let err = DispatchConfig::from_toml_str("offer_ttl_secs = 30")
            .expect_err("lock ttl 25 < offer ttl 30");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "driver_lock_ttl_secs",
                ..
            }
        ));
    }

    #[test]
    fn zero_values_and_bad_resolution_are_rejected() {
        let config = DispatchConfig::default().with_queue_ttl_secs(0);
        assert!(config.validate().is_err());

        let config = DispatchConfig {
            geo_resolution: 16,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DispatchConfig::default().with_default_radius_km(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = DispatchConfig::from_toml_str("offer_ttl_secs = \"soon\"").expect_err("type mismatch");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
