//! Route computation: geocodes the selected trip's destination once per
//! address and recomputes the driving path only when the origin or the
//! destination actually changes.

pub mod planner;

pub use planner::RoutePlanner;
