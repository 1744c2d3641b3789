use std::sync::Arc;

use fleetwatch_protocol::report::{FailureReport, FailureReporter};
use fleetwatch_protocol::raw::RawTripRecord;
use fleetwatch_protocol::store::TripCollectionStore;
use fleetwatch_protocol::trip::Trip;
use fleetwatch_protocol::{TrackingError, TrackingResult, TripId};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::normalize::normalize_trip;

const COMPONENT: &str = "trip-directory";

/// Maintains the normalized trip list and the current selection, fed by a
/// standing subscription to the trip collection.
///
/// Every snapshot replaces the whole list rather than patching it; the
/// heterogeneous record shapes make incremental merges a reliable source of
/// partially updated trips.
pub struct TripDirectory {
    store: Arc<dyn TripCollectionStore>,
    reporter: Arc<dyn FailureReporter>,
    state: Arc<RwLock<DirectoryState>>,
    trips_tx: watch::Sender<Vec<Trip>>,
    selection_tx: watch::Sender<Option<Trip>>,
    ingest_task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct DirectoryState {
    /// Last raw snapshot, kept so `select` can re-normalize the target
    /// record at selection time.
    raw: Vec<RawTripRecord>,
    /// The id the user asked for, sticky across snapshots until it appears.
    requested: Option<TripId>,
}

impl TripDirectory {
    pub fn new(store: Arc<dyn TripCollectionStore>, reporter: Arc<dyn FailureReporter>) -> Self {
        let (trips_tx, _) = watch::channel(Vec::new());
        let (selection_tx, _) = watch::channel(None);
        Self {
            store,
            reporter,
            state: Arc::new(RwLock::new(DirectoryState::default())),
            trips_tx,
            selection_tx,
            ingest_task: Mutex::new(None),
        }
    }

    /// Opens the collection subscription and starts consuming snapshots.
    /// Calling `start` again tears down the previous subscription first.
    pub async fn start(&self) -> TrackingResult<()> {
        let mut stream = self.store.subscribe().await?;

        let state = Arc::clone(&self.state);
        let reporter = Arc::clone(&self.reporter);
        let trips_tx = self.trips_tx.clone();
        let selection_tx = self.selection_tx.clone();

        let task = tokio::spawn(async move {
            loop {
                match stream.next_snapshot().await {
                    Ok(Some(records)) => {
                        apply_snapshot(&state, &trips_tx, &selection_tx, records).await;
                    }
                    Ok(None) => {
                        tracing::debug!("trip collection subscription closed");
                        break;
                    }
                    Err(error) => {
                        reporter.report(FailureReport::new(COMPONENT, None, error));
                        reset_to_empty(&state, &trips_tx, &selection_tx).await;
                        break;
                    }
                }
            }
        });

        if let Some(previous) = self.ingest_task.lock().await.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    /// Explicit user-driven reselection. The target record is re-normalized
    /// at selection time. An id not present in the current snapshot keeps
    /// the current selection visible and stays sticky until a snapshot
    /// delivers it.
    pub async fn select(&self, trip_id: &TripId) {
        let mut state = self.state.write().await;
        state.requested = Some(trip_id.clone());

        match find_and_normalize(&state.raw, trip_id) {
            Some(trip) => {
                let _ = self.selection_tx.send(Some(trip));
            }
            None => {
                tracing::debug!(trip_id = %trip_id, "selection requested for trip not yet in snapshot");
                self.reporter.report(FailureReport::new(
                    COMPONENT,
                    Some(trip_id.clone()),
                    TrackingError::InvalidData(format!("trip {trip_id} not in current snapshot")),
                ));
            }
        }
    }

    /// Latest normalized trip list. Receivers observe full replacements.
    pub fn watch_trips(&self) -> watch::Receiver<Vec<Trip>> {
        self.trips_tx.subscribe()
    }

    /// Latest selection, `None` when the list is empty or the subscription
    /// has failed.
    pub fn watch_selection(&self) -> watch::Receiver<Option<Trip>> {
        self.selection_tx.subscribe()
    }

    pub async fn shutdown(&self) {
        if let Some(task) = self.ingest_task.lock().await.take() {
            task.abort();
        }
        reset_to_empty(&self.state, &self.trips_tx, &self.selection_tx).await;
    }
}

async fn apply_snapshot(
    state: &RwLock<DirectoryState>,
    trips_tx: &watch::Sender<Vec<Trip>>,
    selection_tx: &watch::Sender<Option<Trip>>,
    records: Vec<RawTripRecord>,
) {
    let trips: Vec<Trip> = records.iter().filter_map(normalize_trip).collect();
    let skipped = records.len() - trips.len();
    if skipped > 0 {
        tracing::debug!(skipped, "snapshot records without an id were skipped");
    }

    let mut state = state.write().await;
    state.raw = records;

    let selection = state
        .requested
        .as_ref()
        .and_then(|id| trips.iter().find(|trip| &trip.id == id))
        .or_else(|| trips.first())
        .cloned();

    let _ = trips_tx.send(trips);
    let _ = selection_tx.send(selection);
}

async fn reset_to_empty(
    state: &RwLock<DirectoryState>,
    trips_tx: &watch::Sender<Vec<Trip>>,
    selection_tx: &watch::Sender<Option<Trip>>,
) {
    let mut state = state.write().await;
    state.raw.clear();
    let _ = trips_tx.send(Vec::new());
    let _ = selection_tx.send(None);
}

fn find_and_normalize(raw: &[RawTripRecord], trip_id: &TripId) -> Option<Trip> {
    raw.iter()
        .filter_map(normalize_trip)
        .find(|trip| &trip.id == trip_id)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use fleetwatch_protocol::raw::RawTripRecord;
    use fleetwatch_protocol::report::{FailureReport, FailureReporter};
    use fleetwatch_protocol::store::{
        TripCollectionStore, TripSnapshotStream, TripSnapshotSubscription,
    };
    use fleetwatch_protocol::{TrackingError, TrackingResult, TripId};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::TripDirectory;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    type SnapshotMessage = TrackingResult<Option<Vec<RawTripRecord>>>;

    struct MockCollectionStore {
        receiver: std::sync::Mutex<Option<mpsc::UnboundedReceiver<SnapshotMessage>>>,
    }

    struct MockSnapshotStream {
        receiver: mpsc::UnboundedReceiver<SnapshotMessage>,
    }

    #[async_trait]
    impl TripSnapshotSubscription for MockSnapshotStream {
        async fn next_snapshot(&mut self) -> TrackingResult<Option<Vec<RawTripRecord>>> {
            match self.receiver.recv().await {
                Some(message) => message,
                None => Ok(None),
            }
        }
    }

    #[async_trait]
    impl TripCollectionStore for MockCollectionStore {
        async fn subscribe(&self) -> TrackingResult<TripSnapshotStream> {
            let receiver = self
                .receiver
                .lock()
                .expect("lock mock receiver")
                .take()
                .expect("subscribe called once");
            Ok(Box::new(MockSnapshotStream { receiver }))
        }
    }

    struct NullReporter;

    impl FailureReporter for NullReporter {
        fn report(&self, _failure: FailureReport) {}
    }

    fn record(json: &str) -> RawTripRecord {
        serde_json::from_str(json).expect("deserialize raw record")
    }

    fn directory_with_feed() -> (TripDirectory, mpsc::UnboundedSender<SnapshotMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let store = Arc::new(MockCollectionStore {
            receiver: std::sync::Mutex::new(Some(receiver)),
        });
        let directory = TripDirectory::new(store, Arc::new(NullReporter));
        (directory, sender)
    }

    async fn next_selection(
        receiver: &mut tokio::sync::watch::Receiver<Option<fleetwatch_protocol::trip::Trip>>,
    ) -> Option<fleetwatch_protocol::trip::Trip> {
        timeout(TEST_TIMEOUT, receiver.changed())
            .await
            .expect("selection update within timeout")
            .expect("selection channel open");
        receiver.borrow_and_update().clone()
    }

    #[tokio::test]
    async fn snapshot_replaces_list_and_selects_first_trip() {
        let (directory, feed) = directory_with_feed();
        let mut trips = directory.watch_trips();
        let mut selection = directory.watch_selection();
        directory.start().await.expect("start directory");

        feed.send(Ok(Some(vec![
            record(r#"{"id": "T1", "endLocation": "12 Lake Rd"}"#),
            record(r#"{"id": "T2"}"#),
        ])))
        .expect("feed snapshot");

        timeout(TEST_TIMEOUT, trips.changed())
            .await
            .expect("trips update")
            .expect("trips channel open");
        let list = trips.borrow_and_update().clone();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].route.destination, "12 Lake Rd");

        let selected = next_selection(&mut selection).await.expect("selected");
        assert_eq!(selected.id, TripId::new("T1"));
    }

    #[tokio::test]
    async fn requested_selection_is_honored_when_it_appears() {
        let (directory, feed) = directory_with_feed();
        let mut selection = directory.watch_selection();
        directory.start().await.expect("start directory");

        feed.send(Ok(Some(vec![record(r#"{"id": "T1"}"#)])))
            .expect("feed snapshot");
        let selected = next_selection(&mut selection).await.expect("selected");
        assert_eq!(selected.id, TripId::new("T1"));

        // Request a trip the snapshot does not contain yet; selection stays.
        directory.select(&TripId::new("T9")).await;
        assert_eq!(
            selection.borrow().as_ref().map(|trip| trip.id.clone()),
            Some(TripId::new("T1"))
        );

        feed.send(Ok(Some(vec![
            record(r#"{"id": "T1"}"#),
            record(r#"{"id": "T9", "endLocation": "Harbor Rd"}"#),
        ])))
        .expect("feed snapshot");
        let selected = next_selection(&mut selection).await.expect("selected");
        assert_eq!(selected.id, TripId::new("T9"));
        assert_eq!(selected.route.destination, "Harbor Rd");
    }

    #[tokio::test]
    async fn select_renormalizes_the_target_record() {
        let (directory, feed) = directory_with_feed();
        let mut selection = directory.watch_selection();
        directory.start().await.expect("start directory");

        feed.send(Ok(Some(vec![
            record(r#"{"id": "T1"}"#),
            record(r#"{"tripId": "T2", "endLocation": "12 Lake Rd", "progress": "66%"}"#),
        ])))
        .expect("feed snapshot");
        next_selection(&mut selection).await.expect("initial selection");

        directory.select(&TripId::new("T2")).await;
        let selected = next_selection(&mut selection).await.expect("selected");
        assert_eq!(selected.id, TripId::new("T2"));
        assert_eq!(selected.route.destination, "12 Lake Rd");
        assert_eq!(selected.route.progress, 66);
    }

    #[tokio::test]
    async fn empty_snapshot_clears_the_selection() {
        let (directory, feed) = directory_with_feed();
        let mut selection = directory.watch_selection();
        directory.start().await.expect("start directory");

        feed.send(Ok(Some(vec![record(r#"{"id": "T1"}"#)])))
            .expect("feed snapshot");
        assert!(next_selection(&mut selection).await.is_some());

        feed.send(Ok(Some(Vec::new()))).expect("feed snapshot");
        assert!(next_selection(&mut selection).await.is_none());
    }

    #[tokio::test]
    async fn subscription_error_resets_to_empty_state() {
        let (directory, feed) = directory_with_feed();
        let mut trips = directory.watch_trips();
        let mut selection = directory.watch_selection();
        directory.start().await.expect("start directory");

        feed.send(Ok(Some(vec![record(r#"{"id": "T1"}"#)])))
            .expect("feed snapshot");
        assert!(next_selection(&mut selection).await.is_some());

        feed.send(Err(TrackingError::Subscription(
            "collection watch dropped".to_owned(),
        )))
        .expect("feed error");

        assert!(next_selection(&mut selection).await.is_none());
        timeout(TEST_TIMEOUT, trips.changed())
            .await
            .expect("trips update")
            .expect("trips channel open");
        assert!(trips.borrow_and_update().is_empty());
    }

    #[tokio::test]
    async fn records_without_an_id_are_skipped() {
        let (directory, feed) = directory_with_feed();
        let mut trips = directory.watch_trips();
        directory.start().await.expect("start directory");

        feed.send(Ok(Some(vec![
            record(r#"{"status": "active"}"#),
            record(r#"{"id": "T1"}"#),
        ])))
        .expect("feed snapshot");

        timeout(TEST_TIMEOUT, trips.changed())
            .await
            .expect("trips update")
            .expect("trips channel open");
        let list = trips.borrow_and_update().clone();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, TripId::new("T1"));
    }
}
