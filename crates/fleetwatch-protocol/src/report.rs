use crate::error::TrackingError;
use crate::ids::TripId;

/// Structured failure handed to the observability collaborator. Components
/// recover locally from every failure they report; the report is purely a
/// signal, never a control-flow channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub component: &'static str,
    pub trip_id: Option<TripId>,
    pub error: TrackingError,
    pub retryable: bool,
}

impl FailureReport {
    pub fn new(component: &'static str, trip_id: Option<TripId>, error: TrackingError) -> Self {
        let retryable = error.is_retryable();
        Self {
            component,
            trip_id,
            error,
            retryable,
        }
    }
}

pub trait FailureReporter: Send + Sync {
    fn report(&self, failure: FailureReport);
}

/// Default reporter: structured warning logs, nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl FailureReporter for LogReporter {
    fn report(&self, failure: FailureReport) {
        match &failure.trip_id {
            Some(trip_id) => tracing::warn!(
                component = failure.component,
                trip_id = %trip_id,
                error = %failure.error,
                retryable = failure.retryable,
                "tracking failure"
            ),
            None => tracing::warn!(
                component = failure.component,
                error = %failure.error,
                retryable = failure.retryable,
                "tracking failure"
            ),
        }
    }
}
