//! Shared tracking protocol: trip vocabulary, collaborator contracts, errors.

pub mod error;
pub mod geo;
pub mod ids;
pub mod raw;
pub mod report;
pub mod store;
pub mod trip;

pub use error::{TrackingError, TrackingResult};
pub use geo::{Coordinate, Position, RoutePath, RouteResult, ViewportState};
pub use ids::TripId;
pub use raw::{RawLocationFix, RawTripRecord};
pub use report::{FailureReport, FailureReporter, LogReporter};
pub use store::{
    GeocodingService, LocationStream, LocationStreamStore, LocationSubscription, RoutingService,
    TripCollectionStore, TripSnapshotStream, TripSnapshotSubscription,
};
pub use trip::{Customer, Driver, Trip, TripRoute, TripStatus, Vehicle};
