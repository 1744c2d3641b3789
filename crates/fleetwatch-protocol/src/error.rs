use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackingError {
    #[error("store subscription error: {0}")]
    Subscription(String),
    #[error("invalid location data: {0}")]
    InvalidData(String),
    #[error("geocoding failed: {0}")]
    Geocode(String),
    #[error("routing failed: {0}")]
    Route(String),
    #[error("external call timed out: {0}")]
    Timeout(String),
    #[error("tracking configuration error: {0}")]
    Configuration(String),
    #[error("tracking internal error: {0}")]
    Internal(String),
}

impl TrackingError {
    /// Whether retrying the failed operation could plausibly succeed.
    /// Configuration and data-shape problems never recover on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Subscription(_)
            | Self::Geocode(_)
            | Self::Route(_)
            | Self::Timeout(_)
            | Self::Internal(_) => true,
            Self::InvalidData(_) | Self::Configuration(_) => false,
        }
    }
}

pub type TrackingResult<T> = Result<T, TrackingError>;
