use std::collections::HashMap;
use std::sync::Arc;

use fleetwatch_config::RouteConfig;
use fleetwatch_protocol::geo::{Coordinate, RouteResult};
use fleetwatch_protocol::report::{FailureReport, FailureReporter};
use fleetwatch_protocol::store::{GeocodingService, RoutingService};
use fleetwatch_protocol::trip::Trip;
use fleetwatch_protocol::{TrackingError, TripId};
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::time::timeout;

const COMPONENT: &str = "route-planner";

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Produces a drivable path between the vehicle's live position and the
/// selected trip's destination.
///
/// Geocoding runs once per resolved address per trip selection; routing runs
/// whenever the origin or destination coordinate changes. Failures leave the
/// previous route in place and are reported, never propagated.
pub struct RoutePlanner {
    geocoder: Arc<dyn GeocodingService>,
    router: Arc<dyn RoutingService>,
    reporter: Arc<dyn FailureReporter>,
    config: RouteConfig,
    state: Arc<Mutex<PlannerState>>,
    route_tx: watch::Sender<Option<RouteResult>>,
}

#[derive(Default)]
struct PlannerState {
    /// Bumped on every trip change; in-flight geocode and route results are
    /// discarded when the generation they started under has passed.
    generation: u64,
    trip_id: Option<TripId>,
    destination_address: Option<String>,
    /// Geocode results keyed by address, cleared on trip change.
    geocode_cache: HashMap<String, Coordinate>,
    origin: Option<Coordinate>,
    destination: Option<Coordinate>,
    /// The (origin, destination) pair the published route was computed for.
    last_computed: Option<(Coordinate, Coordinate)>,
}

impl RoutePlanner {
    pub fn new(
        geocoder: Arc<dyn GeocodingService>,
        router: Arc<dyn RoutingService>,
        reporter: Arc<dyn FailureReporter>,
        config: RouteConfig,
    ) -> Self {
        let (route_tx, _) = watch::channel(None);
        Self {
            geocoder,
            router,
            reporter,
            config,
            state: Arc::new(Mutex::new(PlannerState::default())),
            route_tx,
        }
    }

    /// Rebinds the planner to a selection. A different trip clears the route,
    /// the geocode cache, and the tracked origin. The same trip with an
    /// unchanged destination address is a no-op, so selection echoes never
    /// cost a geocoding call.
    pub async fn set_trip(&self, trip: Option<Trip>) {
        let mut state = self.state.lock().await;
        let trip_id = trip.as_ref().map(|trip| trip.id.clone());
        let address = trip.as_ref().and_then(resolve_destination_address);

        if state.trip_id != trip_id {
            state.generation += 1;
            state.trip_id = trip_id;
            state.geocode_cache.clear();
            state.origin = None;
            state.destination = None;
            state.destination_address = None;
            state.last_computed = None;
            let _ = self.route_tx.send(None);
        } else if state.destination_address == address {
            return;
        }

        state.destination_address = address.clone();
        let Some(address) = address else {
            state.destination = None;
            return;
        };

        if let Some(cached) = state.geocode_cache.get(&address).copied() {
            state.destination = Some(cached);
            self.compute_if_ready(state).await;
            return;
        }

        let generation = state.generation;
        let trip_id = state.trip_id.clone();
        drop(state);

        let destination =
            match timeout(self.config.external_call_timeout(), self.geocoder.geocode(&address))
                .await
            {
                Ok(Ok(coordinate)) => coordinate,
                Ok(Err(error)) => {
                    self.reporter
                        .report(FailureReport::new(COMPONENT, trip_id, error));
                    return;
                }
                Err(_) => {
                    self.reporter.report(FailureReport::new(
                        COMPONENT,
                        trip_id,
                        TrackingError::Timeout(format!("geocode {address}")),
                    ));
                    return;
                }
            };
        if !destination.is_valid() {
            self.reporter.report(FailureReport::new(
                COMPONENT,
                trip_id,
                TrackingError::Geocode(format!("invalid coordinate for {address}")),
            ));
            return;
        }

        let mut state = self.state.lock().await;
        if state.generation != generation {
            tracing::debug!(address = %address, "discarding geocode result for replaced trip");
            return;
        }
        state.geocode_cache.insert(address, destination);
        state.destination = Some(destination);
        self.compute_if_ready(state).await;
    }

    /// Feeds the latest accepted vehicle position. Recomputes the route when
    /// the origin moved (past the configured displacement threshold, zero by
    /// default) and a destination is known.
    pub async fn update_origin(&self, origin: Coordinate) {
        let mut state = self.state.lock().await;
        if state.trip_id.is_none() {
            return;
        }
        state.origin = Some(origin);

        if let Some((computed_origin, computed_destination)) = state.last_computed {
            let destination_unchanged = state.destination == Some(computed_destination);
            if destination_unchanged
                && self.config.min_displacement_m > 0.0
                && distance_meters(computed_origin, origin) < self.config.min_displacement_m
            {
                return;
            }
        }

        self.compute_if_ready(state).await;
    }

    /// Latest complete routing outcome, replaced wholesale on recompute and
    /// cleared on trip change.
    pub fn watch_route(&self) -> watch::Receiver<Option<RouteResult>> {
        self.route_tx.subscribe()
    }

    async fn compute_if_ready(&self, state: MutexGuard<'_, PlannerState>) {
        let (Some(origin), Some(destination)) = (state.origin, state.destination) else {
            return;
        };
        if state.last_computed == Some((origin, destination)) {
            return;
        }
        let generation = state.generation;
        let trip_id = state.trip_id.clone();
        drop(state);

        let path = match timeout(
            self.config.external_call_timeout(),
            self.router.route(origin, destination),
        )
        .await
        {
            Ok(Ok(path)) => path,
            Ok(Err(error)) => {
                self.reporter
                    .report(FailureReport::new(COMPONENT, trip_id, error));
                return;
            }
            Err(_) => {
                self.reporter.report(FailureReport::new(
                    COMPONENT,
                    trip_id,
                    TrackingError::Timeout("route".to_owned()),
                ));
                return;
            }
        };

        let mut state = self.state.lock().await;
        if state.generation != generation {
            tracing::debug!("discarding route result for replaced trip");
            return;
        }
        state.last_computed = Some((origin, destination));
        let _ = self.route_tx.send(Some(RouteResult {
            origin,
            destination,
            path,
        }));
    }
}

/// First non-empty of the trip's destination field and the customer address.
fn resolve_destination_address(trip: &Trip) -> Option<String> {
    [&trip.route.destination, &trip.customer.address]
        .into_iter()
        .map(|address| address.trim())
        .find(|address| !address.is_empty())
        .map(str::to_owned)
}

/// Haversine great-circle distance in meters.
fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}
