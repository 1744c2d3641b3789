//! Live location ingestion for the selected trip: a single-flight stream
//! subscription, coordinate validation, and connection health derivation.

pub mod health;
pub mod manager;

pub use health::{ConnectionHealth, SignalQuality};
pub use manager::LocationStreamManager;
