//! Trip directory: keeps a normalized, in-memory view of the trip collection
//! and the currently selected trip, fed by a standing store subscription.

pub mod directory;
pub mod normalize;

pub use directory::TripDirectory;
pub use normalize::normalize_trip;
