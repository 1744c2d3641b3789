use serde::{Deserialize, Serialize};

/// Scalar that arrives as either a number or a formatted string
/// (`66`, `"66"`, `"66%"`, `"95 km"`). Parsing happens in normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawScalar {
    Number(f64),
    Text(String),
}

impl RawScalar {
    /// Best-effort numeric value: numbers pass through, strings are parsed
    /// after trimming trailing non-numeric suffixes.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => {
                let digits: &str = text
                    .trim()
                    .trim_end_matches(|c: char| !c.is_ascii_digit() && c != '.')
                    .trim();
                digits.parse::<f64>().ok()
            }
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Self::Number(value) => value.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawCustomer {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawVehicle {
    pub number: Option<String>,
    #[serde(alias = "type")]
    pub kind: Option<String>,
    pub capacity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawDriver {
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawLocation {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawRoute {
    pub start: Option<String>,
    pub destination: Option<String>,
    pub distance: Option<RawScalar>,
    pub duration: Option<String>,
    pub progress: Option<RawScalar>,
    pub eta: Option<String>,
    #[serde(alias = "currentLocation")]
    pub current_location: Option<RawLocation>,
}

/// Trip record as stored, with every shape variant the collection has been
/// observed to emit: fully nested (`route.destination`), flat
/// (`endLocation`), and mixtures of both. Normalization resolves the
/// alternates with a fixed priority order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawTripRecord {
    #[serde(alias = "tripId")]
    pub id: Option<String>,
    pub status: Option<String>,
    pub customer: Option<RawCustomer>,
    #[serde(alias = "customerName")]
    pub customer_name: Option<String>,
    #[serde(alias = "customerAddress")]
    pub customer_address: Option<String>,
    #[serde(alias = "customerPhone")]
    pub customer_phone: Option<String>,
    pub vehicle: Option<RawVehicle>,
    #[serde(alias = "vehicleId")]
    pub vehicle_id: Option<String>,
    pub driver: Option<RawDriver>,
    #[serde(alias = "driverName")]
    pub driver_name: Option<String>,
    pub route: Option<RawRoute>,
    #[serde(alias = "startLocation")]
    pub start_location: Option<String>,
    #[serde(alias = "endLocation")]
    pub end_location: Option<String>,
    #[serde(alias = "currentLocation")]
    pub current_location: Option<RawLocation>,
    pub progress: Option<RawScalar>,
    #[serde(alias = "estimatedDistance", alias = "totalDistance")]
    pub distance: Option<RawScalar>,
    pub duration: Option<String>,
    pub eta: Option<String>,
}

/// One update from the per-trip location stream. Any field may be absent;
/// the stream manager validates before accepting.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawLocationFix {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub address: Option<String>,
}
