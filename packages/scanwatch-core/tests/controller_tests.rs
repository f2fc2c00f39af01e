//! End-to-end controller behavior against a scripted service.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use scanwatch_core::api::NetworkMapPayload;
use scanwatch_core::{
    ControlError, DeviceStatus, DeviceStatusRecord, Network, NetworkMapGrid, ScanController,
    ScanPhase, ScanService, ScanSnapshot, ScanStatePayload, ViewSink,
};

enum Reply {
    State(ScanStatePayload),
    Conflict,
    Transport,
}

impl Reply {
    fn to_result(&self) -> Result<ScanStatePayload, ControlError> {
        match self {
            Reply::State(payload) => Ok(payload.clone()),
            Reply::Conflict => Err(ControlError::Conflict),
            Reply::Transport => Err(ControlError::Transport("connection refused".into())),
        }
    }
}

/// Scripted [`ScanService`]: state reads pop a queue (falling back to a fixed
/// payload), commands answer with configured replies, every call is counted.
struct MockService {
    state_queue: Mutex<VecDeque<ScanStatePayload>>,
    state_fallback: Mutex<ScanStatePayload>,
    fail_state: AtomicBool,
    start_reply: Mutex<Reply>,
    stop_reply: Mutex<Reply>,
    stop_delay: Mutex<Duration>,
    network_list: Mutex<Vec<Network>>,
    map: Mutex<NetworkMapPayload>,
    state_calls: AtomicUsize,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    select_calls: AtomicUsize,
}

impl Default for MockService {
    fn default() -> Self {
        Self {
            state_queue: Mutex::new(VecDeque::new()),
            state_fallback: Mutex::new(ScanStatePayload::default()),
            fail_state: AtomicBool::new(false),
            start_reply: Mutex::new(Reply::State(ScanStatePayload::default())),
            stop_reply: Mutex::new(Reply::State(ScanStatePayload::default())),
            stop_delay: Mutex::new(Duration::ZERO),
            network_list: Mutex::new(Vec::new()),
            map: Mutex::new(NetworkMapPayload::default()),
            state_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            select_calls: AtomicUsize::new(0),
        }
    }
}

impl MockService {
    fn queue_states(&self, states: impl IntoIterator<Item = ScanStatePayload>) {
        self.state_queue.lock().unwrap().extend(states);
    }

    fn set_fallback(&self, state: ScanStatePayload) {
        *self.state_fallback.lock().unwrap() = state;
    }

    fn set_start_reply(&self, reply: Reply) {
        *self.start_reply.lock().unwrap() = reply;
    }

    fn set_stop_reply(&self, reply: Reply) {
        *self.stop_reply.lock().unwrap() = reply;
    }
}

#[async_trait]
impl ScanService for MockService {
    async fn scan_state(&self) -> Result<ScanStatePayload, ControlError> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_state.load(Ordering::SeqCst) {
            return Err(ControlError::Transport("connection refused".into()));
        }
        let next = self.state_queue.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.state_fallback.lock().unwrap().clone()))
    }

    async fn networks(&self) -> Result<Vec<Network>, ControlError> {
        Ok(self.network_list.lock().unwrap().clone())
    }

    async fn start_scan(&self, _network_id: &str) -> Result<ScanStatePayload, ControlError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.start_reply.lock().unwrap().to_result()
    }

    async fn stop_scan(&self) -> Result<ScanStatePayload, ControlError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.stop_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.stop_reply.lock().unwrap().to_result()
    }

    async fn select_network(&self, _network_id: &str) -> Result<(), ControlError> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn network_map(&self) -> Result<NetworkMapPayload, ControlError> {
        Ok(self.map.lock().unwrap().clone())
    }

    async fn devices(&self) -> Result<Vec<DeviceStatusRecord>, ControlError> {
        Ok(Vec::new())
    }
}

/// Records everything the controller pushes at the view layer.
#[derive(Default)]
struct RecordingView {
    phases: Mutex<Vec<ScanPhase>>,
    notices: Mutex<Vec<String>>,
    map_refreshes: AtomicUsize,
    device_refreshes: AtomicUsize,
}

impl RecordingView {
    /// Observed phases with consecutive duplicates collapsed.
    fn phase_transitions(&self) -> Vec<ScanPhase> {
        let mut out: Vec<ScanPhase> = Vec::new();
        for phase in self.phases.lock().unwrap().iter() {
            if out.last() != Some(phase) {
                out.push(*phase);
            }
        }
        out
    }

    fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }
}

impl ViewSink for RecordingView {
    fn state_changed(&self, snapshot: &ScanSnapshot) {
        self.phases.lock().unwrap().push(snapshot.phase);
    }

    fn map_refreshed(&self, _grid: &NetworkMapGrid) {
        self.map_refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn device_refresh_requested(&self) {
        self.device_refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn notice(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}

fn harness() -> (Arc<MockService>, Arc<RecordingView>, Arc<ScanController>) {
    let service = Arc::new(MockService::default());
    let view = Arc::new(RecordingView::default());
    let controller = ScanController::new(service.clone(), view.clone());
    (service, view, controller)
}

fn running_state(network: &str) -> ScanStatePayload {
    ScanStatePayload {
        is_running: true,
        scan_count: 3,
        start_time: Some(Utc::now()),
        current_network: Some(network.to_string()),
        ..Default::default()
    }
}

fn stopping_state(network: &str) -> ScanStatePayload {
    ScanStatePayload {
        is_stopping: true,
        scan_count: 3,
        start_time: Some(Utc::now()),
        current_network: Some(network.to_string()),
        ..Default::default()
    }
}

fn stopped_state(network: &str) -> ScanStatePayload {
    ScanStatePayload {
        scan_count: 4,
        last_scan_time: Some(Utc::now()),
        selected_network: Some(network.to_string()),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn empty_network_id_fails_validation_without_io() {
    let (service, _view, controller) = harness();

    let err = controller.request_start("   ").await.unwrap_err();
    assert!(matches!(err, ControlError::Validation(_)));
    assert_eq!(service.start_calls.load(Ordering::SeqCst), 0);
    assert_eq!(service.state_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn start_adopts_the_running_state_and_starts_the_clock() {
    let (service, _view, controller) = harness();
    service.set_start_reply(Reply::State(running_state("n1")));
    service.set_fallback(running_state("n1"));

    let snapshot = controller.request_start("n1").await.unwrap();
    assert_eq!(snapshot.phase, ScanPhase::Scanning);
    assert_eq!(snapshot.selected_network.as_deref(), Some("n1"));
    assert!(snapshot.started_at.is_some());
    assert_eq!(service.start_calls.load(Ordering::SeqCst), 1);

    let mut runtime = controller.runtime_display();
    runtime.changed().await.unwrap();
    assert_eq!(runtime.borrow_and_update().len(), "00:00:00".len());

    // The confirmatory fetch fires shortly after the start.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(service.state_calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(controller.snapshot().await.phase, ScanPhase::Scanning);
}

#[tokio::test(start_paused = true)]
async fn start_is_rejected_while_a_scan_is_running() {
    let (service, _view, controller) = harness();
    service.queue_states([running_state("n1")]);
    controller.fetch_state().await.unwrap();

    let err = controller.request_start("n2").await.unwrap_err();
    assert!(matches!(err, ControlError::Validation(_)));
    assert_eq!(service.start_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn start_is_rejected_while_a_stop_is_in_flight() {
    let (service, _view, controller) = harness();
    service.queue_states([stopping_state("n1")]);
    controller.fetch_state().await.unwrap();

    let err = controller.request_start("n1").await.unwrap_err();
    assert!(matches!(err, ControlError::Validation(_)));
    assert_eq!(service.start_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_overlays_stopping_and_polls_to_convergence() {
    let (service, view, controller) = harness();
    service.queue_states([
        running_state("n1"),
        stopping_state("n1"),
        stopped_state("n1"),
    ]);
    service.set_fallback(stopped_state("n1"));
    service.set_stop_reply(Reply::State(stopping_state("n1")));

    controller.fetch_state().await.unwrap();
    controller.request_stop().await.unwrap();

    // Let the one-second poller run: pending at t+1s, settled at t+2s.
    tokio::time::sleep(Duration::from_secs(5)).await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.phase, ScanPhase::Stopped);
    assert!(snapshot.last_scan_at.is_some());
    assert_eq!(service.stop_calls.load(Ordering::SeqCst), 1);
    assert!(view.notices().is_empty());
    assert_eq!(
        view.phase_transitions(),
        vec![ScanPhase::Scanning, ScanPhase::Stopping, ScanPhase::Stopped]
    );
}

#[tokio::test(start_paused = true)]
async fn stop_conflict_reverts_with_a_notice_and_no_poll() {
    let (service, view, controller) = harness();
    controller.fetch_state().await.unwrap();
    service.set_stop_reply(Reply::Conflict);

    controller.request_stop().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(controller.snapshot().await.phase, ScanPhase::Ready);
    assert_eq!(
        view.notices(),
        vec!["No active scan is currently running.".to_string()]
    );
    assert_eq!(service.stop_calls.load(Ordering::SeqCst), 1);
    // The phase never dipped into Stopping: nothing was running.
    assert!(!view.phases.lock().unwrap().contains(&ScanPhase::Stopping));
    // Initial fetch plus the background resync; no poll ticks.
    assert_eq!(service.state_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_stop_rolls_the_overlay_back() {
    let (service, view, controller) = harness();
    service.queue_states([running_state("n1")]);
    service.set_fallback(running_state("n1"));
    service.set_stop_reply(Reply::Transport);

    controller.fetch_state().await.unwrap();
    let err = controller.request_stop().await.unwrap_err();
    assert!(matches!(err, ControlError::Transport(_)));

    tokio::time::sleep(Duration::from_millis(50)).await;

    // Overlay shown, then rolled back to the confirmed scanning state.
    assert!(view.phases.lock().unwrap().contains(&ScanPhase::Stopping));
    assert_eq!(controller.snapshot().await.phase, ScanPhase::Scanning);
    assert_eq!(view.notices().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_stop_requests_issue_one_call() {
    let (service, _view, controller) = harness();
    service.queue_states([running_state("n1")]);
    service.set_fallback(stopped_state("n1"));
    service.set_stop_reply(Reply::State(stopped_state("n1")));
    *service.stop_delay.lock().unwrap() = Duration::from_secs(2);

    controller.fetch_state().await.unwrap();
    let (first, second) = tokio::join!(controller.request_stop(), controller.request_stop());

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(service.stop_calls.load(Ordering::SeqCst), 1);
    assert_eq!(controller.snapshot().await.phase, ScanPhase::Stopped);
}

#[tokio::test(start_paused = true)]
async fn poll_ceiling_exhaustion_notices_once_and_refreshes() {
    let (service, view, controller) = harness();
    service.set_fallback(stopping_state("n1"));
    service.set_stop_reply(Reply::State(stopping_state("n1")));

    controller.fetch_state().await.unwrap();
    controller.request_stop().await.unwrap();

    // 30 polls at one-second cadence, then the forced refresh.
    tokio::time::sleep(Duration::from_secs(40)).await;

    let convergence_notices = view
        .notices()
        .iter()
        .filter(|n| n.contains("did not converge after 30 polls"))
        .count();
    assert_eq!(convergence_notices, 1);
    // Initial fetch + 30 polls + one forced refresh.
    assert_eq!(service.state_calls.load(Ordering::SeqCst), 32);
    // The server never settled, and the controller does not pretend it did.
    assert_eq!(controller.snapshot().await.phase, ScanPhase::Stopping);
}

#[tokio::test(start_paused = true)]
async fn select_network_validates_and_triggers_refreshes() {
    let (service, view, controller) = harness();

    let err = controller.select_network("").await.unwrap_err();
    assert!(matches!(err, ControlError::Validation(_)));
    assert_eq!(service.select_calls.load(Ordering::SeqCst), 0);

    controller.select_network("n2").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(service.select_calls.load(Ordering::SeqCst), 1);
    assert_eq!(view.device_refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_keeps_the_last_known_good_snapshot() {
    let (service, view, controller) = harness();
    service.queue_states([running_state("n1")]);
    controller.fetch_state().await.unwrap();

    service.fail_state.store(true, Ordering::SeqCst);
    let err = controller.fetch_state().await.unwrap_err();
    assert!(matches!(err, ControlError::Transport(_)));

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.phase, ScanPhase::Scanning);
    assert_eq!(snapshot.selected_network.as_deref(), Some("n1"));
    assert_eq!(view.notices().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_selected_network_is_dropped() {
    let (service, _view, controller) = harness();
    *service.network_list.lock().unwrap() = vec![Network {
        id: "n1".into(),
        name: "Office".into(),
        cidr: "192.168.1.0/24".into(),
    }];
    controller.refresh_networks().await.unwrap();

    service.queue_states([running_state("ghost"), running_state("n1")]);
    let snapshot = controller.fetch_state().await.unwrap();
    assert_eq!(snapshot.selected_network, None);

    let snapshot = controller.fetch_state().await.unwrap();
    assert_eq!(snapshot.selected_network.as_deref(), Some("n1"));
}

#[tokio::test(start_paused = true)]
async fn dependent_view_refresh_renders_the_map_and_devices() {
    let (service, view, controller) = harness();
    let mut devices = HashMap::new();
    devices.insert(
        "192.168.1.5".to_string(),
        DeviceStatusRecord {
            ipv4: "192.168.1.5".into(),
            status: DeviceStatus::Online,
            device_id: Some("d5".into()),
        },
    );
    *service.map.lock().unwrap() = NetworkMapPayload {
        base_ip: "192.168.1".into(),
        ip_range: (1..=8).collect(),
        devices,
    };

    controller.refresh_dependent_views().await;

    assert_eq!(view.map_refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(view.device_refreshes.load(Ordering::SeqCst), 1);
    let grid = controller.map().await.unwrap();
    assert_eq!(grid.cells.len(), 8);
}

#[tokio::test(start_paused = true)]
async fn empty_map_payload_clears_the_stored_grid() {
    let (service, view, controller) = harness();
    *service.map.lock().unwrap() = NetworkMapPayload {
        base_ip: "192.168.1".into(),
        ip_range: vec![1, 2],
        devices: HashMap::new(),
    };
    controller.refresh_map().await;
    assert!(controller.map().await.is_some());

    *service.map.lock().unwrap() = NetworkMapPayload::default();
    controller.refresh_map().await;
    assert!(controller.map().await.is_none());
    // Only the first refresh produced a grid to hand to the view.
    assert_eq!(view.map_refreshes.load(Ordering::SeqCst), 1);
}
