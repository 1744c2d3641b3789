//! Map viewport mediation: debounces widget-reported pan and zoom gestures
//! and applies auto-centering commands immediately.

pub mod coordinator;

pub use coordinator::ViewportCoordinator;
