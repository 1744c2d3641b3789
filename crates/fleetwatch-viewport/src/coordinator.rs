use std::sync::Mutex;

use fleetwatch_config::ViewportConfig;
use fleetwatch_protocol::geo::{Coordinate, ViewportState};
use tokio::sync::watch;
use tokio::time::Instant;

/// Single writer of record for the map viewport.
///
/// Widget-reported gestures arrive only through the `user_*` methods, never
/// by the coordinator observing its own published state, which is what keeps
/// renderer feedback loops structurally impossible. Gestures are debounced
/// first-write-wins per interaction class; writes inside the window are
/// dropped, not queued. Auto-centering is a discrete command and bypasses
/// the windows entirely.
pub struct ViewportCoordinator {
    config: ViewportConfig,
    debounce: Mutex<DebounceState>,
    viewport_tx: watch::Sender<ViewportState>,
}

#[derive(Default)]
struct DebounceState {
    last_center_write: Option<Instant>,
    last_zoom_write: Option<Instant>,
}

impl ViewportCoordinator {
    pub fn new(config: ViewportConfig) -> Self {
        let initial = ViewportState::new(
            Coordinate::new(config.default_center_lat, config.default_center_lng),
            config.default_zoom,
        );
        let (viewport_tx, _) = watch::channel(initial);
        Self {
            config,
            debounce: Mutex::new(DebounceState::default()),
            viewport_tx,
        }
    }

    /// Widget reported the user panning the map.
    pub fn user_center_changed(&self, center: Coordinate) {
        if !center.is_valid() {
            tracing::debug!(lat = center.lat, lng = center.lng, "ignoring invalid pan center");
            return;
        }
        let now = Instant::now();
        let mut debounce = self.debounce.lock().expect("debounce state poisoned");
        if within_window(debounce.last_center_write, now, self.config.center_debounce()) {
            return;
        }
        debounce.last_center_write = Some(now);
        drop(debounce);
        self.viewport_tx.send_modify(|viewport| viewport.center = center);
    }

    /// Widget reported the user zooming.
    pub fn user_zoom_changed(&self, zoom: u8) {
        let now = Instant::now();
        let mut debounce = self.debounce.lock().expect("debounce state poisoned");
        if within_window(debounce.last_zoom_write, now, self.config.zoom_debounce()) {
            return;
        }
        debounce.last_zoom_write = Some(now);
        drop(debounce);
        self.viewport_tx.send_modify(|viewport| viewport.zoom = zoom);
    }

    /// Discrete one-shot centering command ("center on vehicle", trip
    /// reselection). Applies immediately, regardless of the gesture windows.
    pub fn auto_center(&self, center: Coordinate) {
        if !center.is_valid() {
            return;
        }
        self.viewport_tx.send_modify(|viewport| viewport.center = center);
    }

    /// Widget finished initializing; re-emit the current state so it has a
    /// viewport to render.
    pub fn map_ready(&self) {
        self.viewport_tx.send_modify(|_| {});
    }

    pub fn watch_viewport(&self) -> watch::Receiver<ViewportState> {
        self.viewport_tx.subscribe()
    }

    pub fn current(&self) -> ViewportState {
        *self.viewport_tx.borrow()
    }
}

fn within_window(last: Option<Instant>, now: Instant, window: std::time::Duration) -> bool {
    last.is_some_and(|last| now.saturating_duration_since(last) < window)
}
