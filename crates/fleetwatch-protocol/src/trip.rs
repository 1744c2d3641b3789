use serde::{Deserialize, Serialize};

use crate::geo::Position;
use crate::ids::TripId;

/// Trip status as reported by the store. The source vocabulary is free-form,
/// so unknown strings are preserved rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TripStatus {
    Pending,
    Assigned,
    Scheduled,
    Active,
    InTransit,
    Completed,
    Cancelled,
    Other(String),
}

impl TripStatus {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "assigned" => Self::Assigned,
            "scheduled" => Self::Scheduled,
            "active" => Self::Active,
            "in-transit" | "in transit" => Self::InTransit,
            "completed" | "delivered" => Self::Completed,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Other(value.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Scheduled => "scheduled",
            Self::Active => "active",
            Self::InTransit => "in-transit",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Other(value) => value,
        }
    }
}

impl From<String> for TripStatus {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<TripStatus> for String {
    fn from(value: TripStatus) -> Self {
        value.as_str().to_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub address: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub number: String,
    pub kind: String,
    pub capacity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRoute {
    pub start: String,
    pub destination: String,
    pub distance_km: f64,
    pub duration: String,
    /// Completion percentage, clamped to 0..=100 during normalization.
    pub progress: u8,
    pub eta: String,
    pub current_location: Option<Position>,
}

/// Canonical trip record. Every nested object is always populated;
/// normalization synthesizes defaults for anything the source omitted, so
/// consumers never branch on missing sub-objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub status: TripStatus,
    pub customer: Customer,
    pub vehicle: Vehicle,
    pub driver: Driver,
    pub route: TripRoute,
}
