//! Live dashboard loop.
//!
//! Runs the scan session controller headlessly: periodic state fetches, the
//! 10-second map refresh, and the runtime clock, printing changes as they
//! arrive and shutting down cleanly on Ctrl+C.

use std::sync::Arc;

use anyhow::Result;
use scanwatch_core::{
    NetworkMapGrid, ScanApiClient, ScanController, ScanPhase, ScanSnapshot, ViewSink,
};
use tokio::time::{Duration, interval};

/// Prints controller notifications to the terminal.
struct TerminalView;

impl ViewSink for TerminalView {
    fn state_changed(&self, snapshot: &ScanSnapshot) {
        let network = snapshot.selected_network.as_deref().unwrap_or("-");
        match snapshot.phase {
            ScanPhase::Scanning => {
                println!("[scan] scanning {network} (scans: {})", snapshot.scan_count)
            }
            ScanPhase::Stopping => println!("[scan] stopping..."),
            ScanPhase::Ready | ScanPhase::Stopped => {
                println!("[scan] idle (scans: {})", snapshot.scan_count)
            }
        }
    }

    fn map_refreshed(&self, grid: &NetworkMapGrid) {
        print!("{}", crate::render_map_text(grid));
    }

    fn device_refresh_requested(&self) {
        println!("[devices] refreshed");
    }

    fn notice(&self, message: &str) {
        println!("[notice] {message}");
    }

    fn has_device_view(&self) -> bool {
        false
    }
}

/// Run the dashboard loop until Ctrl+C.
pub async fn run_watch(interval_secs: u64) -> Result<()> {
    let client = ScanApiClient::from_config()?;
    tracing::info!(
        "Watching scan server {} (state every {}s)",
        client.base_url(),
        interval_secs
    );

    let controller = ScanController::new(Arc::new(client), Arc::new(TerminalView));

    if let Err(e) = controller.refresh_networks().await {
        tracing::warn!("Initial network list fetch failed: {e}");
    }
    if let Err(e) = controller.fetch_state().await {
        tracing::warn!("Initial state fetch failed: {e}");
    }
    controller.start_map_updates().await;

    let mut runtime = controller.runtime_display();
    let mut state_timer = interval(Duration::from_secs(interval_secs.max(1)));
    // Skip the immediate tick; we just fetched.
    state_timer.tick().await;

    loop {
        tokio::select! {
            _ = state_timer.tick() => {
                if let Err(e) = controller.fetch_state().await {
                    tracing::debug!("state fetch failed: {e}");
                }
            }
            changed = runtime.changed() => {
                if changed.is_ok() {
                    let display = runtime.borrow_and_update().clone();
                    if controller.snapshot().await.phase.is_active() {
                        println!("[runtime] {display}");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    controller.shutdown().await;
    tracing::info!("Watch stopped");
    Ok(())
}
