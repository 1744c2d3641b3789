use serde::{Deserialize, Serialize};

/// A geographic point. Consumers may rely on both components being finite
/// and inside the valid latitude/longitude ranges once a coordinate has
/// passed [`Coordinate::is_valid`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and inside [-90, 90] x [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// A validated coordinate plus the reverse-geocoded address the device
/// reported alongside it, when any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub coordinate: Coordinate,
    pub address: Option<String>,
}

impl Position {
    pub fn new(coordinate: Coordinate, address: Option<String>) -> Self {
        Self { coordinate, address }
    }
}

/// Polyline returned by the routing service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoutePath {
    pub points: Vec<Coordinate>,
}

/// One complete routing outcome. Replaced wholesale on recomputation so
/// consumers never observe a half-updated path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub path: RoutePath,
}

/// Map viewport shared between user gestures and auto-centering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub center: Coordinate,
    pub zoom: u8,
}

impl ViewportState {
    pub fn new(center: Coordinate, zoom: u8) -> Self {
        Self { center, zoom }
    }
}
