//! Live trip tracking core: wires the trip directory, the location stream
//! manager, the route planner, and the viewport coordinator into one
//! facade the dashboard consumes.

pub mod tracker;

pub use fleetwatch_config::TrackingConfig;
pub use fleetwatch_location::{ConnectionHealth, SignalQuality};
pub use fleetwatch_protocol::geo::{Coordinate, Position, RouteResult, ViewportState};
pub use fleetwatch_protocol::report::{FailureReport, FailureReporter, LogReporter};
pub use fleetwatch_protocol::trip::{Trip, TripStatus};
pub use fleetwatch_protocol::{TrackingError, TrackingResult, TripId};
pub use tracker::{TrackingSnapshot, TripTracker};
