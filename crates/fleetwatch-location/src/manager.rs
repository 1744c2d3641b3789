use std::sync::Arc;

use fleetwatch_config::{LocationConfig, ServiceArea};
use fleetwatch_protocol::geo::{Coordinate, Position};
use fleetwatch_protocol::raw::RawLocationFix;
use fleetwatch_protocol::report::{FailureReport, FailureReporter};
use fleetwatch_protocol::store::{LocationStream, LocationStreamStore};
use fleetwatch_protocol::{TrackingError, TripId};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::health::{classify_signal, ConnectionHealth, SignalQuality};

const COMPONENT: &str = "location-stream";

/// Owns the single outstanding location subscription, always bound to the
/// currently tracked trip id. No other component opens location streams.
///
/// The ingestion task re-checks the tracked id before applying each fix, so
/// a late callback from a stream that has since been replaced is discarded
/// instead of misapplied.
pub struct LocationStreamManager {
    store: Arc<dyn LocationStreamStore>,
    reporter: Arc<dyn FailureReporter>,
    config: LocationConfig,
    state: Arc<RwLock<TrackedState>>,
    position_tx: watch::Sender<Option<Position>>,
    health_tx: watch::Sender<ConnectionHealth>,
}

#[derive(Default)]
struct TrackedState {
    current: Option<TripId>,
    last_accepted: Option<Instant>,
    ingest_task: Option<JoinHandle<()>>,
}

impl LocationStreamManager {
    pub fn new(
        store: Arc<dyn LocationStreamStore>,
        reporter: Arc<dyn FailureReporter>,
        config: LocationConfig,
    ) -> Self {
        let (position_tx, _) = watch::channel(None);
        let (health_tx, _) = watch::channel(ConnectionHealth::Disconnected);
        Self {
            store,
            reporter,
            config,
            state: Arc::new(RwLock::new(TrackedState::default())),
            position_tx,
            health_tx,
        }
    }

    /// Rebinds the subscription to `trip_id`. Tracking the id already
    /// tracked is a no-op, so selection echoes never leak subscriptions.
    /// `None` tears the subscription down.
    pub async fn track(&self, trip_id: Option<TripId>) {
        {
            let mut state = self.state.write().await;
            if state.current == trip_id {
                return;
            }
            if let Some(task) = state.ingest_task.take() {
                task.abort();
            }
            state.current = trip_id.clone();
            state.last_accepted = None;
            let _ = self.position_tx.send(None);
            let _ = self.health_tx.send(ConnectionHealth::Disconnected);
        }

        let Some(trip_id) = trip_id else {
            return;
        };

        tracing::debug!(trip_id = %trip_id, "opening location stream");
        let stream = match self.store.subscribe(&trip_id).await {
            Ok(stream) => stream,
            Err(error) => {
                self.reporter
                    .report(FailureReport::new(COMPONENT, Some(trip_id.clone()), error));
                // Back to idle, otherwise the idempotence guard would turn
                // every later track of this id into a no-op with no stream.
                let mut state = self.state.write().await;
                if state.current.as_ref() == Some(&trip_id) {
                    state.current = None;
                }
                return;
            }
        };

        let mut state = self.state.write().await;
        // A reselection won the race while the subscription was opening;
        // dropping the stream unused closes it.
        if state.current.as_ref() != Some(&trip_id) {
            return;
        }
        let task = tokio::spawn(ingest(
            stream,
            trip_id,
            Arc::clone(&self.state),
            self.position_tx.clone(),
            self.health_tx.clone(),
            Arc::clone(&self.reporter),
            self.config.service_area,
        ));
        if let Some(previous) = state.ingest_task.replace(task) {
            previous.abort();
        }
    }

    /// Latest accepted position. Retained across invalid fixes and stream
    /// drops within a trip; cleared when the tracked trip changes.
    pub fn watch_position(&self) -> watch::Receiver<Option<Position>> {
        self.position_tx.subscribe()
    }

    pub fn watch_health(&self) -> watch::Receiver<ConnectionHealth> {
        self.health_tx.subscribe()
    }

    pub async fn current_trip(&self) -> Option<TripId> {
        self.state.read().await.current.clone()
    }

    /// Recency classification of the tracked stream.
    pub async fn signal_quality(&self) -> SignalQuality {
        let state = self.state.read().await;
        if state.current.is_none() {
            return SignalQuality::Offline;
        }
        classify_signal(
            state.last_accepted,
            Instant::now(),
            self.config.offline_timeout(),
            self.config.unstable_fraction,
        )
    }

    pub async fn shutdown(&self) {
        self.track(None).await;
    }
}

async fn ingest(
    mut stream: LocationStream,
    trip_id: TripId,
    state: Arc<RwLock<TrackedState>>,
    position_tx: watch::Sender<Option<Position>>,
    health_tx: watch::Sender<ConnectionHealth>,
    reporter: Arc<dyn FailureReporter>,
    service_area: Option<ServiceArea>,
) {
    loop {
        let message = stream.next_fix().await;

        // Tag check at callback time: the fix belongs to this stream's trip,
        // which may no longer be the tracked one.
        {
            let state = state.read().await;
            if state.current.as_ref() != Some(&trip_id) {
                tracing::debug!(trip_id = %trip_id, "discarding fix for stale subscription");
                return;
            }
        }

        match message {
            Ok(Some(fix)) => {
                apply_fix(
                    fix,
                    &trip_id,
                    &state,
                    &position_tx,
                    &health_tx,
                    &reporter,
                    service_area,
                )
                .await;
            }
            Ok(None) => {
                tracing::debug!(trip_id = %trip_id, "location stream closed");
                let _ = health_tx.send(ConnectionHealth::Disconnected);
                return;
            }
            Err(error) => {
                reporter.report(FailureReport::new(COMPONENT, Some(trip_id.clone()), error));
                let _ = health_tx.send(ConnectionHealth::Disconnected);
                return;
            }
        }
    }
}

async fn apply_fix(
    fix: RawLocationFix,
    trip_id: &TripId,
    state: &RwLock<TrackedState>,
    position_tx: &watch::Sender<Option<Position>>,
    health_tx: &watch::Sender<ConnectionHealth>,
    reporter: &Arc<dyn FailureReporter>,
    service_area: Option<ServiceArea>,
) {
    let coordinate = match (fix.lat, fix.lng) {
        (Some(lat), Some(lng)) => Coordinate::new(lat, lng),
        _ => {
            reject_fix(trip_id, "fix missing lat or lng", health_tx, reporter);
            return;
        }
    };
    if !coordinate.is_valid() {
        reject_fix(trip_id, "non-finite or out-of-range fix", health_tx, reporter);
        return;
    }

    if let Some(area) = service_area {
        if !area.contains(coordinate.lat, coordinate.lng) {
            // Accepted anyway; the vehicle may legitimately leave the
            // service region, but the operator should hear about it.
            reporter.report(FailureReport::new(
                COMPONENT,
                Some(trip_id.clone()),
                TrackingError::InvalidData(format!(
                    "accepted fix outside the service area: {}, {}",
                    coordinate.lat, coordinate.lng
                )),
            ));
        }
    }

    state.write().await.last_accepted = Some(Instant::now());
    let _ = position_tx.send(Some(Position::new(coordinate, fix.address)));
    let _ = health_tx.send(ConnectionHealth::Connected);
}

fn reject_fix(
    trip_id: &TripId,
    reason: &str,
    health_tx: &watch::Sender<ConnectionHealth>,
    reporter: &Arc<dyn FailureReporter>,
) {
    reporter.report(FailureReport::new(
        COMPONENT,
        Some(trip_id.clone()),
        TrackingError::InvalidData(reason.to_owned()),
    ));
    let _ = health_tx.send(ConnectionHealth::Disconnected);
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use fleetwatch_config::LocationConfig;
    use fleetwatch_protocol::geo::Position;
    use fleetwatch_protocol::raw::RawLocationFix;
    use fleetwatch_protocol::report::{FailureReport, FailureReporter};
    use fleetwatch_protocol::store::{LocationStream, LocationStreamStore, LocationSubscription};
    use fleetwatch_protocol::{TrackingError, TrackingResult, TripId};
    use tokio::sync::{mpsc, watch};
    use tokio::time::timeout;

    use super::{ConnectionHealth, LocationStreamManager, SignalQuality};

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    type FixMessage = TrackingResult<Option<RawLocationFix>>;

    struct MockLocationStore {
        feeds: Mutex<HashMap<String, mpsc::UnboundedReceiver<FixMessage>>>,
        subscribe_count: AtomicUsize,
        open_streams: Arc<AtomicUsize>,
    }

    struct MockStream {
        receiver: mpsc::UnboundedReceiver<FixMessage>,
        open_streams: Arc<AtomicUsize>,
    }

    impl Drop for MockStream {
        fn drop(&mut self) {
            self.open_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl LocationSubscription for MockStream {
        async fn next_fix(&mut self) -> TrackingResult<Option<RawLocationFix>> {
            match self.receiver.recv().await {
                Some(message) => message,
                None => Ok(None),
            }
        }
    }

    #[async_trait]
    impl LocationStreamStore for MockLocationStore {
        async fn subscribe(&self, trip_id: &TripId) -> TrackingResult<LocationStream> {
            let receiver = self
                .feeds
                .lock()
                .expect("lock feeds")
                .remove(trip_id.as_str())
                .expect("feed registered for trip");
            self.subscribe_count.fetch_add(1, Ordering::SeqCst);
            self.open_streams.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockStream {
                receiver,
                open_streams: Arc::clone(&self.open_streams),
            }))
        }
    }

    #[derive(Default)]
    struct CollectingReporter {
        reports: Mutex<Vec<FailureReport>>,
    }

    impl FailureReporter for CollectingReporter {
        fn report(&self, failure: FailureReport) {
            self.reports.lock().expect("lock reports").push(failure);
        }
    }

    struct Harness {
        manager: LocationStreamManager,
        store: Arc<MockLocationStore>,
        reporter: Arc<CollectingReporter>,
        feeds: HashMap<String, mpsc::UnboundedSender<FixMessage>>,
    }

    fn harness(trip_ids: &[&str]) -> Harness {
        let mut receivers = HashMap::new();
        let mut feeds = HashMap::new();
        for id in trip_ids {
            let (sender, receiver) = mpsc::unbounded_channel();
            receivers.insert((*id).to_owned(), receiver);
            feeds.insert((*id).to_owned(), sender);
        }
        let store = Arc::new(MockLocationStore {
            feeds: Mutex::new(receivers),
            subscribe_count: AtomicUsize::new(0),
            open_streams: Arc::new(AtomicUsize::new(0)),
        });
        let reporter = Arc::new(CollectingReporter::default());
        let manager = LocationStreamManager::new(
            Arc::clone(&store) as Arc<dyn LocationStreamStore>,
            Arc::clone(&reporter) as Arc<dyn FailureReporter>,
            LocationConfig::default(),
        );
        Harness {
            manager,
            store,
            reporter,
            feeds,
        }
    }

    fn fix(lat: f64, lng: f64) -> FixMessage {
        Ok(Some(RawLocationFix {
            lat: Some(lat),
            lng: Some(lng),
            address: None,
        }))
    }

    async fn wait_for_health(
        receiver: &mut watch::Receiver<ConnectionHealth>,
        expected: ConnectionHealth,
    ) {
        timeout(TEST_TIMEOUT, async {
            while *receiver.borrow_and_update() != expected {
                receiver.changed().await.expect("health channel open");
            }
        })
        .await
        .expect("health reached expected state");
    }

    async fn wait_for_position(
        receiver: &mut watch::Receiver<Option<Position>>,
        lat: f64,
        lng: f64,
    ) {
        timeout(TEST_TIMEOUT, async {
            loop {
                if let Some(position) = receiver.borrow_and_update().as_ref() {
                    if position.coordinate.lat == lat && position.coordinate.lng == lng {
                        return;
                    }
                }
                receiver.changed().await.expect("position channel open");
            }
        })
        .await
        .expect("position reached expected value");
    }

    #[tokio::test]
    async fn valid_fix_publishes_position_and_connected_health() {
        let h = harness(&["T1"]);
        let mut position = h.manager.watch_position();
        let mut health = h.manager.watch_health();

        h.manager.track(Some(TripId::new("T1"))).await;
        h.feeds["T1"].send(fix(7.29, 80.63)).expect("send fix");

        wait_for_position(&mut position, 7.29, 80.63).await;
        wait_for_health(&mut health, ConnectionHealth::Connected).await;
    }

    #[tokio::test]
    async fn invalid_fix_disconnects_but_keeps_last_position() {
        let h = harness(&["T1"]);
        let mut position = h.manager.watch_position();
        let mut health = h.manager.watch_health();

        h.manager.track(Some(TripId::new("T1"))).await;
        h.feeds["T1"].send(fix(7.29, 80.63)).expect("send fix");
        wait_for_health(&mut health, ConnectionHealth::Connected).await;

        h.feeds["T1"]
            .send(Ok(Some(RawLocationFix {
                lat: Some(f64::NAN),
                lng: Some(80.63),
                address: None,
            })))
            .expect("send fix");
        wait_for_health(&mut health, ConnectionHealth::Disconnected).await;

        let last = position.borrow_and_update().clone().expect("position kept");
        assert_eq!(last.coordinate.lat, 7.29);

        let reports = h.reporter.reports.lock().expect("lock reports");
        assert!(reports
            .iter()
            .any(|r| matches!(r.error, TrackingError::InvalidData(_)) && !r.retryable));
    }

    #[tokio::test]
    async fn fix_missing_a_component_is_rejected() {
        let h = harness(&["T1"]);
        let mut health = h.manager.watch_health();

        h.manager.track(Some(TripId::new("T1"))).await;
        h.feeds["T1"]
            .send(Ok(Some(RawLocationFix {
                lat: Some(7.29),
                lng: None,
                address: None,
            })))
            .expect("send fix");

        wait_for_health(&mut health, ConnectionHealth::Disconnected).await;
        assert!(h.manager.watch_position().borrow().is_none());
    }

    struct FlakyLocationStore {
        attempts: AtomicUsize,
        feed: Mutex<Option<mpsc::UnboundedReceiver<FixMessage>>>,
        open_streams: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LocationStreamStore for FlakyLocationStore {
        async fn subscribe(&self, _trip_id: &TripId) -> TrackingResult<LocationStream> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(TrackingError::Subscription("store unavailable".to_owned()));
            }
            let receiver = self
                .feed
                .lock()
                .expect("lock flaky feed")
                .take()
                .expect("feed consumed once");
            self.open_streams.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockStream {
                receiver,
                open_streams: Arc::clone(&self.open_streams),
            }))
        }
    }

    #[tokio::test]
    async fn failed_subscribe_returns_to_idle_so_the_same_trip_can_retry() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let store = Arc::new(FlakyLocationStore {
            attempts: AtomicUsize::new(0),
            feed: Mutex::new(Some(receiver)),
            open_streams: Arc::new(AtomicUsize::new(0)),
        });
        let reporter = Arc::new(CollectingReporter::default());
        let manager = LocationStreamManager::new(
            Arc::clone(&store) as Arc<dyn LocationStreamStore>,
            Arc::clone(&reporter) as Arc<dyn FailureReporter>,
            LocationConfig::default(),
        );
        let mut health = manager.watch_health();

        manager.track(Some(TripId::new("T1"))).await;
        assert_eq!(manager.current_trip().await, None);
        assert!(!reporter.reports.lock().expect("lock reports").is_empty());

        // The store recovered; tracking the same trip must open a stream.
        manager.track(Some(TripId::new("T1"))).await;
        assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(manager.current_trip().await, Some(TripId::new("T1")));

        sender.send(fix(7.29, 80.63)).expect("send fix");
        wait_for_health(&mut health, ConnectionHealth::Connected).await;
    }

    #[tokio::test]
    async fn out_of_area_fix_is_accepted_but_flagged() {
        let h = harness(&["T1"]);
        let mut position = h.manager.watch_position();
        let mut health = h.manager.watch_health();

        h.manager.track(Some(TripId::new("T1"))).await;
        // Valid coordinate, far outside the default service region.
        h.feeds["T1"].send(fix(48.85, 2.35)).expect("send fix");

        wait_for_position(&mut position, 48.85, 2.35).await;
        wait_for_health(&mut health, ConnectionHealth::Connected).await;

        timeout(TEST_TIMEOUT, async {
            loop {
                let flagged = h.reporter.reports.lock().expect("lock reports").iter().any(
                    |report| {
                        matches!(
                            &report.error,
                            TrackingError::InvalidData(message) if message.contains("service area")
                        )
                    },
                );
                if flagged {
                    return;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("out-of-area fix reported");
    }

    #[tokio::test]
    async fn tracking_the_same_trip_again_is_a_no_op() {
        let h = harness(&["T1"]);
        h.manager.track(Some(TripId::new("T1"))).await;
        h.manager.track(Some(TripId::new("T1"))).await;
        h.manager.track(Some(TripId::new("T1"))).await;
        assert_eq!(h.store.subscribe_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn switching_trips_closes_the_previous_subscription() {
        let h = harness(&["T1", "T2"]);
        h.manager.track(Some(TripId::new("T1"))).await;
        h.manager.track(Some(TripId::new("T2"))).await;

        assert_eq!(h.store.subscribe_count.load(Ordering::SeqCst), 2);
        timeout(TEST_TIMEOUT, async {
            while h.store.open_streams.load(Ordering::SeqCst) > 1 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("previous stream closed");
        assert_eq!(h.manager.current_trip().await, Some(TripId::new("T2")));
    }

    #[tokio::test]
    async fn late_fix_for_a_replaced_trip_never_lands() {
        let h = harness(&["T1", "T2"]);
        let mut position = h.manager.watch_position();

        h.manager.track(Some(TripId::new("T1"))).await;
        h.manager.track(Some(TripId::new("T2"))).await;

        // A fix for the deselected trip arrives after the switch.
        let _ = h.feeds["T1"].send(fix(1.0, 1.0));
        h.feeds["T2"].send(fix(7.30, 80.64)).expect("send fix");

        wait_for_position(&mut position, 7.30, 80.64).await;
        let current = position.borrow().clone().expect("position present");
        assert_eq!(current.coordinate.lat, 7.30);
    }

    #[tokio::test]
    async fn stream_close_marks_disconnected_and_keeps_position() {
        let h = harness(&["T1"]);
        let mut position = h.manager.watch_position();
        let mut health = h.manager.watch_health();

        h.manager.track(Some(TripId::new("T1"))).await;
        h.feeds["T1"].send(fix(7.29, 80.63)).expect("send fix");
        wait_for_health(&mut health, ConnectionHealth::Connected).await;

        h.feeds["T1"].send(Ok(None)).expect("send close");
        wait_for_health(&mut health, ConnectionHealth::Disconnected).await;
        assert!(position.borrow_and_update().is_some());
    }

    #[tokio::test]
    async fn stream_error_is_reported_and_disconnects() {
        let h = harness(&["T1"]);
        let mut health = h.manager.watch_health();

        h.manager.track(Some(TripId::new("T1"))).await;
        h.feeds["T1"]
            .send(Err(TrackingError::Subscription("socket reset".to_owned())))
            .expect("send error");

        wait_for_health(&mut health, ConnectionHealth::Disconnected).await;
        timeout(TEST_TIMEOUT, async {
            loop {
                if !h.reporter.reports.lock().expect("lock reports").is_empty() {
                    return;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("error reported");
    }

    #[tokio::test(start_paused = true)]
    async fn signal_quality_tracks_fix_recency() {
        let h = harness(&["T1"]);
        let mut health = h.manager.watch_health();

        assert_eq!(h.manager.signal_quality().await, SignalQuality::Offline);

        h.manager.track(Some(TripId::new("T1"))).await;
        assert_eq!(
            h.manager.signal_quality().await,
            SignalQuality::NeverConnected
        );

        h.feeds["T1"].send(fix(7.29, 80.63)).expect("send fix");
        wait_for_health(&mut health, ConnectionHealth::Connected).await;
        assert_eq!(h.manager.signal_quality().await, SignalQuality::Live);

        tokio::time::advance(Duration::from_secs(70)).await;
        assert_eq!(h.manager.signal_quality().await, SignalQuality::Unstable);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(h.manager.signal_quality().await, SignalQuality::Offline);
    }
}
