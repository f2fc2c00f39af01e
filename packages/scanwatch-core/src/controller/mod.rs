//! Scan session controller.
//!
//! Owns the canonical [`ScanSnapshot`] and the transition rules around it:
//! user actions (start/stop/select) issue guarded remote calls, server
//! responses replace the snapshot wholesale, and a stop request hands off to
//! the convergence poller until the server reports a quiesced scan. All
//! session state lives on this object; its lifecycle is tied to the page (or
//! process) that mounts it, not to process-wide globals.

mod poll;
mod refresh;

pub use poll::{POLL_CEILING, POLL_INTERVAL};
pub use refresh::MAP_REFRESH_INTERVAL;

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;

use crate::api::ServiceHandle;
use crate::clock::RuntimeClock;
use crate::error::ControlError;
use crate::grid::{DeviceStatusRecord, NetworkMapGrid};
use crate::guard::{GuardOutcome, RequestGuard, RequestKey};
use crate::session::{Network, ScanPhase, ScanSnapshot, ScanStatePayload};
use crate::view::ViewHandle;

/// Deadline for plain state reads.
const STATE_TIMEOUT: Duration = Duration::from_secs(5);
/// Start/stop/select get a longer allowance; the server does real work.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(15);
/// Deadline for map and device-grid refreshes.
const REFRESH_TIMEOUT: Duration = Duration::from_secs(10);
/// Delay before the confirmatory state fetch after a start, correcting for
/// servers that answer before work has actually begun.
const CONFIRM_DELAY: Duration = Duration::from_millis(500);

struct ControllerState {
    /// Last server-confirmed snapshot. Never blanked on transient failure.
    confirmed: ScanSnapshot,
    /// Optimistic overlay shown while a stop request is in flight. Distinct
    /// from the confirmed snapshot so a failed stop rolls back cleanly.
    optimistic: Option<ScanSnapshot>,
    networks: Vec<Network>,
    devices: Vec<DeviceStatusRecord>,
    map: Option<NetworkMapGrid>,
    /// Active convergence poll session, if any: (epoch, cancellation handle).
    poll: Option<(u64, CancellationToken)>,
    map_updates: Option<CancellationToken>,
}

impl ControllerState {
    fn current(&self) -> &ScanSnapshot {
        self.optimistic.as_ref().unwrap_or(&self.confirmed)
    }
}

/// The scan session controller. Create one per mounted scan-control view and
/// share it via `Arc`.
pub struct ScanController {
    service: ServiceHandle,
    guard: RequestGuard,
    view: ViewHandle,
    clock: RuntimeClock,
    snapshot_tx: watch::Sender<ScanSnapshot>,
    poll_epoch: AtomicU64,
    /// Back-reference for handing owned clones to spawned tasks.
    self_ref: Weak<ScanController>,
    state: Mutex<ControllerState>,
}

impl ScanController {
    pub fn new(service: ServiceHandle, view: ViewHandle) -> Arc<Self> {
        let (snapshot_tx, _) = watch::channel(ScanSnapshot::initial());
        Arc::new_cyclic(|self_ref| Self {
            service,
            guard: RequestGuard::new(),
            view,
            clock: RuntimeClock::new(),
            snapshot_tx,
            poll_epoch: AtomicU64::new(0),
            self_ref: self_ref.clone(),
            state: Mutex::new(ControllerState {
                confirmed: ScanSnapshot::initial(),
                optimistic: None,
                networks: Vec::new(),
                devices: Vec::new(),
                map: None,
                poll: None,
                map_updates: None,
            }),
        })
    }

    /// The snapshot readers currently observe (optimistic overlay if one is
    /// pending, otherwise the confirmed state).
    pub async fn snapshot(&self) -> ScanSnapshot {
        self.state.lock().await.current().clone()
    }

    /// Watch every snapshot replacement, including optimistic overlays.
    pub fn subscribe(&self) -> watch::Receiver<ScanSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Rendered `HH:MM:SS` runtime, ticking while a scan is active.
    pub fn runtime_display(&self) -> watch::Receiver<String> {
        self.clock.display()
    }

    pub async fn networks(&self) -> Vec<Network> {
        self.state.lock().await.networks.clone()
    }

    /// Device snapshot from the last device-grid refresh.
    pub async fn devices(&self) -> Vec<DeviceStatusRecord> {
        self.state.lock().await.devices.clone()
    }

    /// Grid from the last map refresh, if one has completed.
    pub async fn map(&self) -> Option<NetworkMapGrid> {
        self.state.lock().await.map.clone()
    }

    /// Guarded, timeout-bounded read of the remote scan state. On success the
    /// snapshot is replaced wholesale; on failure the last known-good
    /// snapshot stays in place and a non-blocking notice is surfaced.
    pub async fn fetch_state(&self) -> Result<ScanSnapshot, ControlError> {
        match self
            .guard
            .call(RequestKey::ScanState, STATE_TIMEOUT, self.service.scan_state())
            .await
        {
            GuardOutcome::Skipped => Ok(self.snapshot().await),
            GuardOutcome::Completed(Ok(payload)) => Ok(self.adopt(payload).await),
            GuardOutcome::Completed(Err(e)) => {
                self.notify_error(&e);
                Err(e)
            }
        }
    }

    /// Refresh the known-network list used to populate the selector and to
    /// validate the server's selected-network reference.
    pub async fn refresh_networks(&self) -> Result<Vec<Network>, ControlError> {
        match self
            .guard
            .call(RequestKey::NetworkList, STATE_TIMEOUT, self.service.networks())
            .await
        {
            GuardOutcome::Skipped => Ok(self.state.lock().await.networks.clone()),
            GuardOutcome::Completed(Ok(networks)) => {
                self.state.lock().await.networks = networks.clone();
                Ok(networks)
            }
            GuardOutcome::Completed(Err(e)) => {
                self.notify_error(&e);
                Err(e)
            }
        }
    }

    /// Start scanning `network_id`.
    ///
    /// Fails fast with `Validation` (no network I/O) when the id is empty or
    /// the session is not settled; a new start may only be issued once the
    /// previous scan has fully stopped.
    pub async fn request_start(&self, network_id: &str) -> Result<ScanSnapshot, ControlError> {
        let network_id = network_id.trim();
        if network_id.is_empty() {
            return Err(ControlError::Validation(
                "select a network before starting a scan".into(),
            ));
        }
        match self.snapshot().await.phase {
            ScanPhase::Stopping => {
                return Err(ControlError::Validation(
                    "a stop is still in progress; wait for the scan to settle".into(),
                ));
            }
            ScanPhase::Scanning => {
                return Err(ControlError::Validation("a scan is already running".into()));
            }
            ScanPhase::Ready | ScanPhase::Stopped => {}
        }

        match self
            .guard
            .call(
                RequestKey::StartScan,
                COMMAND_TIMEOUT,
                self.service.start_scan(network_id),
            )
            .await
        {
            GuardOutcome::Skipped => Ok(self.snapshot().await),
            GuardOutcome::Completed(Ok(payload)) => {
                tracing::info!("scan started on network '{}'", network_id);
                let snapshot = self.adopt(payload).await;
                self.spawn_refresh();
                // The server may answer before work has actually started;
                // confirm shortly after.
                if let Some(controller) = self.self_ref.upgrade() {
                    tokio::spawn(async move {
                        tokio::time::sleep(CONFIRM_DELAY).await;
                        if let Err(e) = controller.fetch_state().await {
                            tracing::debug!("confirmatory state fetch failed: {e}");
                        }
                    });
                }
                Ok(snapshot)
            }
            GuardOutcome::Completed(Err(e)) => {
                self.notify_error(&e);
                Err(e)
            }
        }
    }

    /// Request a stop of the running scan.
    ///
    /// An optimistic `Stopping` overlay renders before the call resolves so
    /// the control never flickers back to ready. A 409 reverts the overlay
    /// and surfaces a one-time notice; any other failure drops the overlay
    /// and refetches the authoritative state instead of guessing.
    pub async fn request_stop(&self) -> Result<(), ControlError> {
        let overlaid = {
            let mut st = self.state.lock().await;
            if st.current().phase == ScanPhase::Scanning {
                st.optimistic = Some(st.confirmed.stopping_overlay());
                true
            } else {
                false
            }
        };
        if overlaid {
            self.publish_current().await;
        }

        match self
            .guard
            .call(RequestKey::StopScan, COMMAND_TIMEOUT, self.service.stop_scan())
            .await
        {
            GuardOutcome::Skipped => Ok(()),
            GuardOutcome::Completed(Ok(payload)) => {
                let snapshot = self.adopt(payload).await;
                if snapshot.phase == ScanPhase::Stopping {
                    self.begin_poll_session().await;
                } else {
                    tracing::debug!("stop settled immediately, no convergence poll needed");
                }
                Ok(())
            }
            GuardOutcome::Completed(Err(ControlError::Conflict)) => {
                self.clear_optimistic().await;
                self.view.notice("No active scan is currently running.");
                self.resync_in_background();
                Ok(())
            }
            GuardOutcome::Completed(Err(e)) => {
                self.clear_optimistic().await;
                self.notify_error(&e);
                self.resync_in_background();
                Err(e)
            }
        }
    }

    /// Select a network without starting a scan. On success the dependent
    /// views refresh; the scan phase is untouched.
    pub async fn select_network(&self, network_id: &str) -> Result<(), ControlError> {
        let network_id = network_id.trim();
        if network_id.is_empty() {
            return Err(ControlError::Validation("no network id given".into()));
        }
        match self
            .guard
            .call(
                RequestKey::SelectNetwork,
                COMMAND_TIMEOUT,
                self.service.select_network(network_id),
            )
            .await
        {
            GuardOutcome::Skipped => Ok(()),
            GuardOutcome::Completed(Ok(())) => {
                tracing::debug!("network '{}' selected", network_id);
                self.spawn_refresh();
                Ok(())
            }
            GuardOutcome::Completed(Err(e)) => {
                self.notify_error(&e);
                Err(e)
            }
        }
    }

    /// Cancel the poll session, the periodic map refresh, and the runtime
    /// clock. Call on page unmount.
    pub async fn shutdown(&self) {
        let mut st = self.state.lock().await;
        if let Some((_, cancel)) = st.poll.take() {
            cancel.cancel();
        }
        if let Some(cancel) = st.map_updates.take() {
            cancel.cancel();
        }
        drop(st);
        self.clock.set_started_at(None);
    }

    /// Replace the confirmed snapshot with a server response, clearing any
    /// optimistic overlay, and fan refreshes out when an active phase settled.
    async fn adopt(&self, payload: ScanStatePayload) -> ScanSnapshot {
        let (prev_phase, current) = {
            let mut st = self.state.lock().await;
            let prev_phase = st.current().phase;
            let mut snapshot = payload.into_snapshot();
            validate_selection(&st.networks, &mut snapshot);
            st.confirmed = snapshot;
            st.optimistic = None;
            (prev_phase, st.confirmed.clone())
        };
        self.clock.set_started_at(current.started_at);
        self.snapshot_tx.send_replace(current.clone());
        self.view.state_changed(&current);
        if prev_phase.is_active() && current.phase.is_settled() {
            tracing::debug!("scan settled ({:?} -> {:?})", prev_phase, current.phase);
            self.spawn_refresh();
        }
        current
    }

    async fn clear_optimistic(&self) {
        let reverted = {
            let mut st = self.state.lock().await;
            st.optimistic.take().is_some()
        };
        if reverted {
            self.publish_current().await;
        }
    }

    async fn publish_current(&self) {
        let current = self.state.lock().await.current().clone();
        self.clock.set_started_at(current.started_at);
        self.snapshot_tx.send_replace(current.clone());
        self.view.state_changed(&current);
    }

    fn notify_error(&self, err: &ControlError) {
        if err.is_transient() {
            tracing::warn!("{err}");
            self.view.notice(&err.to_string());
        } else {
            tracing::debug!("{err}");
        }
    }

    /// Re-fetch the authoritative state without blocking the caller.
    fn resync_in_background(&self) {
        let Some(controller) = self.self_ref.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = controller.fetch_state().await {
                tracing::debug!("state resync failed: {e}");
            }
        });
    }
}

/// `selected_network` must reference a network the client knows about, or be
/// absent. Skipped while the list has not been fetched yet.
fn validate_selection(networks: &[Network], snapshot: &mut ScanSnapshot) {
    if let Some(id) = snapshot.selected_network.as_deref() {
        if !networks.is_empty() && !networks.iter().any(|n| n.id == id) {
            tracing::debug!("selected network '{}' not in the known list, dropping", id);
            snapshot.selected_network = None;
        }
    }
}
