//! Dependent view refreshes.
//!
//! After a settled transition (and after start/select) the network map and
//! the device grid both refresh, each under its own guard key so a slow map
//! fetch cannot block the device grid or vice versa. A view that is not
//! mounted on the current page is skipped outright.

use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::guard::{GuardOutcome, RequestKey};

use super::{REFRESH_TIMEOUT, ScanController};

/// Cadence of the periodic map refresh while the map view is mounted.
pub const MAP_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

impl ScanController {
    /// Refresh both dependent views without blocking the caller.
    pub(super) fn spawn_refresh(&self) {
        let Some(controller) = self.self_ref.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            controller.refresh_dependent_views().await;
        });
    }

    /// Map and device-grid refresh, concurrently and independently guarded.
    pub async fn refresh_dependent_views(&self) {
        tokio::join!(self.refresh_map(), self.refresh_devices());
    }

    /// Rebuild the network map grid from fresh server data. The grid is
    /// regenerated in full, never patched, so stale entries cannot survive a
    /// refresh. On failure the previous grid stays in place.
    pub async fn refresh_map(&self) {
        if !self.view.has_map_view() {
            return;
        }
        match self
            .guard
            .call(RequestKey::NetworkMap, REFRESH_TIMEOUT, self.service.network_map())
            .await
        {
            GuardOutcome::Skipped => {}
            GuardOutcome::Completed(Ok(payload)) => {
                if payload.is_empty() {
                    tracing::debug!("network map empty, nothing to render");
                    self.state.lock().await.map = None;
                    return;
                }
                let grid = payload.render();
                self.state.lock().await.map = Some(grid.clone());
                self.view.map_refreshed(&grid);
            }
            GuardOutcome::Completed(Err(e)) => {
                tracing::warn!("network map refresh failed: {e}");
            }
        }
    }

    /// Pull a fresh device snapshot and ask the device grid to re-render.
    pub async fn refresh_devices(&self) {
        if !self.view.has_device_view() {
            return;
        }
        match self
            .guard
            .call(RequestKey::DeviceGrid, REFRESH_TIMEOUT, self.service.devices())
            .await
        {
            GuardOutcome::Skipped => {}
            GuardOutcome::Completed(Ok(devices)) => {
                self.state.lock().await.devices = devices;
                self.view.device_refresh_requested();
            }
            GuardOutcome::Completed(Err(e)) => {
                tracing::warn!("device refresh failed: {e}");
            }
        }
    }

    /// Refresh the map immediately and then every [`MAP_REFRESH_INTERVAL`]
    /// until stopped. Starting again replaces any running loop.
    pub async fn start_map_updates(&self) {
        let Some(controller) = self.self_ref.upgrade() else {
            return;
        };
        let cancel = CancellationToken::new();
        {
            let mut st = self.state.lock().await;
            if let Some(prior) = st.map_updates.replace(cancel.clone()) {
                prior.cancel();
            }
        }
        tokio::spawn(async move {
            let mut ticker = interval(MAP_REFRESH_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => controller.refresh_map().await,
                }
            }
        });
    }

    /// Stop the periodic map refresh loop.
    pub async fn stop_map_updates(&self) {
        if let Some(cancel) = self.state.lock().await.map_updates.take() {
            cancel.cancel();
        }
    }
}
