//! Seam between the controller and the view layer.
//!
//! The controller never renders markup; it emits callback-style notifications
//! through a [`ViewSink`] the embedding page registers. A page without a map
//! or device grid mounted reports that through the capability probes and the
//! corresponding refreshes become no-ops.

use std::sync::Arc;

use crate::grid::NetworkMapGrid;
use crate::session::ScanSnapshot;

pub trait ViewSink: Send + Sync {
    /// A new internally-consistent snapshot replaced the previous one.
    fn state_changed(&self, snapshot: &ScanSnapshot);

    /// The network map grid was rebuilt from fresh server data.
    fn map_refreshed(&self, grid: &NetworkMapGrid) {
        let _ = grid;
    }

    /// The device grid should re-pull its data (see `ScanController::devices`).
    fn device_refresh_requested(&self) {}

    /// One-time, non-blocking user notice (conflict, timeout, ...).
    fn notice(&self, message: &str) {
        let _ = message;
    }

    /// Whether a network-map view is mounted on the current page.
    fn has_map_view(&self) -> bool {
        true
    }

    /// Whether a device-grid view is mounted on the current page.
    fn has_device_view(&self) -> bool {
        true
    }
}

pub type ViewHandle = Arc<dyn ViewSink>;

/// Sink for pages with no dependent views mounted.
pub struct NullView;

impl ViewSink for NullView {
    fn state_changed(&self, _snapshot: &ScanSnapshot) {}

    fn has_map_view(&self) -> bool {
        false
    }

    fn has_device_view(&self) -> bool {
        false
    }
}
