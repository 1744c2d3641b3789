//! Tracking configuration: tunables for viewport debounce, GPS staleness,
//! and external call timeouts, loadable from a TOML file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_FLEETWATCH_CONFIG: &str = "FLEETWATCH_CONFIG";

const DEFAULT_CENTER_DEBOUNCE_MS: u64 = 500;
const DEFAULT_ZOOM_DEBOUNCE_MS: u64 = 300;
const DEFAULT_VIEWPORT_ZOOM: u8 = 13;
const DEFAULT_VIEWPORT_CENTER_LAT: f64 = 6.9271;
const DEFAULT_VIEWPORT_CENTER_LNG: f64 = 79.8612;
const DEFAULT_EXTERNAL_CALL_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MIN_ROUTE_DISPLACEMENT_M: f64 = 0.0;
const DEFAULT_GPS_OFFLINE_TIMEOUT_SECS: u64 = 90;
const DEFAULT_GPS_UNSTABLE_FRACTION: f64 = 0.7;

// Service region the fleet operates in; fixes outside it are accepted but
// flagged to the reporter.
const DEFAULT_SERVICE_AREA_LAT_MIN: f64 = 5.8;
const DEFAULT_SERVICE_AREA_LAT_MAX: f64 = 7.9;
const DEFAULT_SERVICE_AREA_LNG_MIN: f64 = 79.6;
const DEFAULT_SERVICE_AREA_LNG_MAX: f64 = 81.9;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServiceArea {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
}

impl ServiceArea {
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        (self.lat_min..=self.lat_max).contains(&lat)
            && (self.lng_min..=self.lng_max).contains(&lng)
    }
}

impl Default for ServiceArea {
    fn default() -> Self {
        Self {
            lat_min: DEFAULT_SERVICE_AREA_LAT_MIN,
            lat_max: DEFAULT_SERVICE_AREA_LAT_MAX,
            lng_min: DEFAULT_SERVICE_AREA_LNG_MIN,
            lng_max: DEFAULT_SERVICE_AREA_LNG_MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportConfig {
    #[serde(default = "default_center_debounce_ms")]
    pub center_debounce_ms: u64,
    #[serde(default = "default_zoom_debounce_ms")]
    pub zoom_debounce_ms: u64,
    #[serde(default = "default_viewport_zoom")]
    pub default_zoom: u8,
    #[serde(default = "default_viewport_center_lat")]
    pub default_center_lat: f64,
    #[serde(default = "default_viewport_center_lng")]
    pub default_center_lng: f64,
}

impl ViewportConfig {
    pub fn center_debounce(&self) -> Duration {
        Duration::from_millis(self.center_debounce_ms)
    }

    pub fn zoom_debounce(&self) -> Duration {
        Duration::from_millis(self.zoom_debounce_ms)
    }
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            center_debounce_ms: DEFAULT_CENTER_DEBOUNCE_MS,
            zoom_debounce_ms: DEFAULT_ZOOM_DEBOUNCE_MS,
            default_zoom: DEFAULT_VIEWPORT_ZOOM,
            default_center_lat: DEFAULT_VIEWPORT_CENTER_LAT,
            default_center_lng: DEFAULT_VIEWPORT_CENTER_LNG,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(default = "default_external_call_timeout_secs")]
    pub external_call_timeout_secs: u64,
    /// Minimum origin displacement, in meters, before a route recompute.
    /// Zero keeps the reference behavior of recomputing on every changed fix.
    #[serde(default = "default_min_route_displacement_m")]
    pub min_displacement_m: f64,
}

impl RouteConfig {
    pub fn external_call_timeout(&self) -> Duration {
        Duration::from_secs(self.external_call_timeout_secs)
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            external_call_timeout_secs: DEFAULT_EXTERNAL_CALL_TIMEOUT_SECS,
            min_displacement_m: DEFAULT_MIN_ROUTE_DISPLACEMENT_M,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_gps_offline_timeout_secs")]
    pub offline_timeout_secs: u64,
    /// Fraction of the offline timeout after which the signal is flagged
    /// unstable.
    #[serde(default = "default_gps_unstable_fraction")]
    pub unstable_fraction: f64,
    #[serde(default = "default_service_area")]
    pub service_area: Option<ServiceArea>,
}

impl LocationConfig {
    pub fn offline_timeout(&self) -> Duration {
        Duration::from_secs(self.offline_timeout_secs)
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            offline_timeout_secs: DEFAULT_GPS_OFFLINE_TIMEOUT_SECS,
            unstable_fraction: DEFAULT_GPS_UNSTABLE_FRACTION,
            service_area: Some(ServiceArea::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default)]
    pub viewport: ViewportConfig,
    #[serde(default)]
    pub route: RouteConfig,
    #[serde(default)]
    pub location: LocationConfig,
}

impl TrackingConfig {
    /// Loads from the path named by `FLEETWATCH_CONFIG`, falling back to
    /// defaults when the variable is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(ENV_FLEETWATCH_CONFIG) {
            Ok(path) => Self::load(Path::new(&path)),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.location.unstable_fraction) {
            return Err(ConfigError::Invalid(format!(
                "location.unstable_fraction must be within 0..=1, got {}",
                self.location.unstable_fraction
            )));
        }
        if self.location.offline_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "location.offline_timeout_secs must be greater than 0".to_owned(),
            ));
        }
        if self.route.min_displacement_m < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "route.min_displacement_m must not be negative, got {}",
                self.route.min_displacement_m
            )));
        }
        if let Some(area) = &self.location.service_area {
            if area.lat_min > area.lat_max || area.lng_min > area.lng_max {
                return Err(ConfigError::Invalid(
                    "location.service_area bounds are inverted".to_owned(),
                ));
            }
        }
        Ok(())
    }
}

fn default_center_debounce_ms() -> u64 {
    DEFAULT_CENTER_DEBOUNCE_MS
}

fn default_zoom_debounce_ms() -> u64 {
    DEFAULT_ZOOM_DEBOUNCE_MS
}

fn default_viewport_zoom() -> u8 {
    DEFAULT_VIEWPORT_ZOOM
}

fn default_viewport_center_lat() -> f64 {
    DEFAULT_VIEWPORT_CENTER_LAT
}

fn default_viewport_center_lng() -> f64 {
    DEFAULT_VIEWPORT_CENTER_LNG
}

fn default_external_call_timeout_secs() -> u64 {
    DEFAULT_EXTERNAL_CALL_TIMEOUT_SECS
}

fn default_min_route_displacement_m() -> f64 {
    DEFAULT_MIN_ROUTE_DISPLACEMENT_M
}

fn default_gps_offline_timeout_secs() -> u64 {
    DEFAULT_GPS_OFFLINE_TIMEOUT_SECS
}

fn default_gps_unstable_fraction() -> f64 {
    DEFAULT_GPS_UNSTABLE_FRACTION
}

fn default_service_area() -> Option<ServiceArea> {
    Some(ServiceArea::default())
}
