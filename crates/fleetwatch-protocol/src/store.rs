use async_trait::async_trait;

use crate::error::TrackingResult;
use crate::geo::{Coordinate, RoutePath};
use crate::ids::TripId;
use crate::raw::{RawLocationFix, RawTripRecord};

/// Standing subscription to the trip collection. Every change emits a full
/// snapshot of all records; `Ok(None)` means the subscription closed.
#[async_trait]
pub trait TripSnapshotSubscription: Send {
    async fn next_snapshot(&mut self) -> TrackingResult<Option<Vec<RawTripRecord>>>;
}

pub type TripSnapshotStream = Box<dyn TripSnapshotSubscription>;

#[async_trait]
pub trait TripCollectionStore: Send + Sync {
    async fn subscribe(&self) -> TrackingResult<TripSnapshotStream>;
}

/// Per-trip raw GPS stream. `Ok(None)` means the stream closed.
#[async_trait]
pub trait LocationSubscription: Send {
    async fn next_fix(&mut self) -> TrackingResult<Option<RawLocationFix>>;
}

pub type LocationStream = Box<dyn LocationSubscription>;

#[async_trait]
pub trait LocationStreamStore: Send + Sync {
    async fn subscribe(&self, trip_id: &TripId) -> TrackingResult<LocationStream>;
}

#[async_trait]
pub trait GeocodingService: Send + Sync {
    async fn geocode(&self, address: &str) -> TrackingResult<Coordinate>;
}

#[async_trait]
pub trait RoutingService: Send + Sync {
    async fn route(&self, origin: Coordinate, destination: Coordinate)
        -> TrackingResult<RoutePath>;
}
