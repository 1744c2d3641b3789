//! Connection health derived from the location stream.
//!
//! [`ConnectionHealth`] is the binary signal the dashboard shows: a direct
//! function of the latest accepted or rejected update, with no hysteresis.
//! Honest flapping beats masked instability here. [`SignalQuality`] refines
//! it with update recency for the tracking detail panel.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionHealth {
    Connected,
    Disconnected,
}

/// Recency classification of the tracked trip's GPS signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalQuality {
    /// Updates arriving well within the offline timeout.
    Live,
    /// Last update older than the unstable fraction of the timeout.
    Unstable,
    /// Last update older than the offline timeout, or no subscription.
    Offline,
    /// A subscription is open but no fix has been accepted yet.
    NeverConnected,
}

/// Classifies the signal from the last accepted fix time. `None` means no
/// fix has been accepted on the current subscription.
pub fn classify_signal(
    last_accepted: Option<Instant>,
    now: Instant,
    offline_timeout: Duration,
    unstable_fraction: f64,
) -> SignalQuality {
    let Some(last_accepted) = last_accepted else {
        return SignalQuality::NeverConnected;
    };
    let elapsed = now.saturating_duration_since(last_accepted);
    if elapsed >= offline_timeout {
        return SignalQuality::Offline;
    }
    let unstable_after = offline_timeout.mul_f64(unstable_fraction.clamp(0.0, 1.0));
    if elapsed >= unstable_after {
        SignalQuality::Unstable
    } else {
        SignalQuality::Live
    }
}
