use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_DB_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_RETENTION_DAYS: i64 = 7;
const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_GEOCODER_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DELIVERY_BASE_URL: &str = "https://b2b.taxi.yandex.net";
const DEFAULT_GEOCODER_BASE_URL: &str = "https://geocode-maps.yandex.ru/1.x/";

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_db_max_connections() -> u32 {
    DEFAULT_DB_MAX_CONNECTIONS
}
fn default_db_min_connections() -> u32 {
    DEFAULT_DB_MIN_CONNECTIONS
}
fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}
fn default_retention_days() -> i64 {
    DEFAULT_RETENTION_DAYS
}
fn default_delivery_timeout() -> u64 {
    DEFAULT_DELIVERY_TIMEOUT_SECS
}
fn default_geocoder_timeout() -> u64 {
    DEFAULT_GEOCODER_TIMEOUT_SECS
}
fn default_delivery_base_url() -> String {
    DEFAULT_DELIVERY_BASE_URL.to_string()
}
fn default_geocoder_base_url() -> String {
    DEFAULT_GEOCODER_BASE_URL.to_string()
}
fn default_pickup_coordinates() -> [f64; 2] {
    // [longitude, latitude]
    [37.6000, 55.8000]
}
fn default_destination_coordinates() -> [f64; 2] {
    [37.6173, 55.7558]
}
fn default_pickup_country() -> String {
    "Россия".to_string()
}

/// Delivery quote provider configuration
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DeliveryConfig {
    /// API token for the delivery provider; `None` means quoting is disabled
    /// and every estimate degrades to zero cost.
    #[serde(default)]
    pub token: Option<String>,

    /// Base URL of the quote API
    #[serde(default = "default_delivery_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_delivery_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_delivery_base_url(),
            request_timeout_secs: DEFAULT_DELIVERY_TIMEOUT_SECS,
        }
    }
}

/// Geocoder configuration
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GeocoderConfig {
    /// API key; `None` means geocoding always falls back to default coordinates.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_geocoder_base_url")]
    pub base_url: String,

    #[serde(default = "default_geocoder_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_geocoder_base_url(),
            request_timeout_secs: DEFAULT_GEOCODER_TIMEOUT_SECS,
        }
    }
}

/// Pickup (origin) point used for every delivery quote.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PickupConfig {
    #[serde(default)]
    pub fullname: String,

    /// [longitude, latitude] of the pickup point
    #[serde(default = "default_pickup_coordinates")]
    pub coordinates: [f64; 2],

    #[serde(default)]
    pub city: String,

    #[serde(default = "default_pickup_country")]
    pub country: String,

    #[serde(default)]
    pub street: String,

    /// Fallback destination coordinates when the customer address cannot be
    /// geocoded.
    #[serde(default = "default_destination_coordinates")]
    pub default_destination: [f64; 2],
}

impl Default for PickupConfig {
    fn default() -> Self {
        Self {
            fullname: String::new(),
            coordinates: default_pickup_coordinates(),
            city: String::new(),
            country: default_pickup_country(),
            street: String::new(),
            default_destination: default_destination_coordinates(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Deployment environment name
    #[serde(default = "default_environment")]
    pub environment: String,

    /// TTL for cached business lookups, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Days after which cancelled/completed orders become eligible for
    /// deletion by the retention sweep.
    #[validate(range(min = 1, max = 365))]
    #[serde(default = "default_retention_days")]
    pub order_retention_days: i64,

    #[serde(default)]
    #[validate]
    pub delivery: DeliveryConfig,

    #[serde(default)]
    #[validate]
    pub geocoder: GeocoderConfig,

    #[serde(default)]
    #[validate]
    pub pickup: PickupConfig,
}

impl AppConfig {
    /// Minimal constructor used by tests and embedded setups.
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            db_min_connections: DEFAULT_DB_MIN_CONNECTIONS,
            log_level: default_log_level(),
            environment,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            order_retention_days: DEFAULT_RETENTION_DAYS,
            delivery: DeliveryConfig::default(),
            geocoder: GeocoderConfig::default(),
            pickup: PickupConfig::default(),
        }
    }

    /// Loads configuration from layered sources: `config/default.toml`, an
    /// environment-specific file, and `APP__`-prefixed environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let mut builder = Config::builder();

        let default_path = Path::new(CONFIG_DIR).join("default.toml");
        if default_path.exists() {
            builder = builder.add_source(File::from(default_path));
        }

        let env_path = Path::new(CONFIG_DIR).join(format!("{environment}.toml"));
        if env_path.exists() {
            builder = builder.add_source(File::from(env_path));
        }

        builder = builder.add_source(Environment::with_prefix("APP").separator("__"));

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let cfg = AppConfig::new("sqlite::memory:".into(), "test".into());
        assert_eq!(cfg.order_retention_days, 7);
        assert_eq!(cfg.cache_ttl_secs, 300);
        assert!(cfg.delivery.token.is_none());
        assert_eq!(cfg.pickup.default_destination, [37.6173, 55.7558]);
    }

    #[test]
    fn retention_window_is_validated() {
        let mut cfg = AppConfig::new("sqlite::memory:".into(), "test".into());
        cfg.order_retention_days = 0;
        assert!(cfg.validate().is_err());
    }
}
