use std::sync::Arc;

use fleetwatch_config::TrackingConfig;
use fleetwatch_directory::TripDirectory;
use fleetwatch_location::{ConnectionHealth, LocationStreamManager, SignalQuality};
use fleetwatch_protocol::geo::{Coordinate, Position, RouteResult, ViewportState};
use fleetwatch_protocol::report::FailureReporter;
use fleetwatch_protocol::store::{
    GeocodingService, LocationStreamStore, RoutingService, TripCollectionStore,
};
use fleetwatch_protocol::trip::Trip;
use fleetwatch_protocol::{TrackingResult, TripId};
use fleetwatch_route::RoutePlanner;
use fleetwatch_viewport::ViewportCoordinator;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Everything the tracking panel needs to render, captured at one moment.
#[derive(Debug, Clone, Serialize)]
pub struct TrackingSnapshot {
    pub selected: Option<Trip>,
    pub position: Option<Position>,
    pub health: ConnectionHealth,
    pub signal: SignalQuality,
    pub route: Option<RouteResult>,
    pub viewport: ViewportState,
}

/// Composition root of the tracking core.
///
/// A single coordination task reacts to selection and position changes:
/// selection drives the location subscription and the route planner's trip
/// binding, accepted positions drive route recomputation. Each component
/// still enforces its own guarantees; the tracker only moves data between
/// them.
pub struct TripTracker {
    directory: Arc<TripDirectory>,
    locations: Arc<LocationStreamManager>,
    planner: Arc<RoutePlanner>,
    viewport: Arc<ViewportCoordinator>,
    coordination_task: Mutex<Option<JoinHandle<()>>>,
}

impl TripTracker {
    pub fn new(
        trips: Arc<dyn TripCollectionStore>,
        locations: Arc<dyn LocationStreamStore>,
        geocoder: Arc<dyn GeocodingService>,
        router: Arc<dyn RoutingService>,
        config: TrackingConfig,
        reporter: Arc<dyn FailureReporter>,
    ) -> Self {
        let directory = Arc::new(TripDirectory::new(trips, Arc::clone(&reporter)));
        let locations = Arc::new(LocationStreamManager::new(
            locations,
            Arc::clone(&reporter),
            config.location.clone(),
        ));
        let planner = Arc::new(RoutePlanner::new(
            geocoder,
            router,
            Arc::clone(&reporter),
            config.route.clone(),
        ));
        let viewport = Arc::new(ViewportCoordinator::new(config.viewport.clone()));
        Self {
            directory,
            locations,
            planner,
            viewport,
            coordination_task: Mutex::new(None),
        }
    }

    /// Opens the trip collection subscription and starts the coordination
    /// task. Calling `start` again restarts both.
    pub async fn start(&self) -> TrackingResult<()> {
        self.directory.start().await?;

        let mut selection = self.directory.watch_selection();
        let mut position = self.locations.watch_position();
        let locations = Arc::clone(&self.locations);
        let planner = Arc::clone(&self.planner);
        let viewport = Arc::clone(&self.viewport);

        let task = tokio::spawn(async move {
            let mut current_id: Option<TripId> = None;
            loop {
                tokio::select! {
                    changed = selection.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let trip = selection.borrow_and_update().clone();
                        let trip_id = trip.as_ref().map(|trip| trip.id.clone());

                        locations.track(trip_id.clone()).await;
                        if trip_id != current_id {
                            // Jump the map to the trip's stored location so
                            // the operator isn't staring at the old trip.
                            if let Some(stored) = trip
                                .as_ref()
                                .and_then(|trip| trip.route.current_location.as_ref())
                            {
                                viewport.auto_center(stored.coordinate);
                            }
                            current_id = trip_id;
                        }
                        planner.set_trip(trip).await;
                    }
                    changed = position.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let accepted = position.borrow_and_update().clone();
                        if let Some(accepted) = accepted {
                            planner.update_origin(accepted.coordinate).await;
                        }
                    }
                }
            }
            tracing::debug!("tracking coordination task stopped");
        });

        if let Some(previous) = self.coordination_task.lock().await.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    pub async fn select_trip(&self, trip_id: &TripId) {
        self.directory.select(trip_id).await;
    }

    /// One-shot command: jump the viewport to the vehicle's latest accepted
    /// position, if there is one.
    pub fn center_on_vehicle(&self) {
        let position = self.locations.watch_position().borrow().clone();
        if let Some(position) = position {
            self.viewport.auto_center(position.coordinate);
        }
    }

    pub fn user_center_changed(&self, center: Coordinate) {
        self.viewport.user_center_changed(center);
    }

    pub fn user_zoom_changed(&self, zoom: u8) {
        self.viewport.user_zoom_changed(zoom);
    }

    pub fn map_ready(&self) {
        self.viewport.map_ready();
    }

    pub fn watch_trips(&self) -> watch::Receiver<Vec<Trip>> {
        self.directory.watch_trips()
    }

    pub fn watch_selection(&self) -> watch::Receiver<Option<Trip>> {
        self.directory.watch_selection()
    }

    pub fn watch_position(&self) -> watch::Receiver<Option<Position>> {
        self.locations.watch_position()
    }

    pub fn watch_health(&self) -> watch::Receiver<ConnectionHealth> {
        self.locations.watch_health()
    }

    pub fn watch_route(&self) -> watch::Receiver<Option<RouteResult>> {
        self.planner.watch_route()
    }

    pub fn watch_viewport(&self) -> watch::Receiver<ViewportState> {
        self.viewport.watch_viewport()
    }

    pub async fn signal_quality(&self) -> SignalQuality {
        self.locations.signal_quality().await
    }

    pub async fn snapshot(&self) -> TrackingSnapshot {
        TrackingSnapshot {
            selected: self.directory.watch_selection().borrow().clone(),
            position: self.locations.watch_position().borrow().clone(),
            health: *self.locations.watch_health().borrow(),
            signal: self.locations.signal_quality().await,
            route: self.planner.watch_route().borrow().clone(),
            viewport: self.viewport.current(),
        }
    }

    pub async fn shutdown(&self) {
        if let Some(task) = self.coordination_task.lock().await.take() {
            task.abort();
        }
        self.locations.shutdown().await;
        self.directory.shutdown().await;
        self.planner.set_trip(None).await;
    }
}
