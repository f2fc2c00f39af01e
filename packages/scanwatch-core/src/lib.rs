//! Scanwatch Core Library
//!
//! This crate provides the client-side controller for a remote
//! network-scanning service:
//! - Scan session control (start/stop, optimistic state, convergence polling)
//! - Single-flight, timeout-bounded remote calls
//! - Network map projection (sparse device map onto a contiguous range)
//! - Runtime clock for the elapsed-time display
//!
//! The remote scan engine is opaque: this crate only consumes its HTTP API
//! and notifies a view layer through callbacks; it never renders markup.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use scanwatch_core::{NullView, ScanApiClient, ScanController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), scanwatch_core::ControlError> {
//!     let client = ScanApiClient::from_config()?;
//!     let controller = ScanController::new(Arc::new(client), Arc::new(NullView));
//!
//!     controller.refresh_networks().await?;
//!     let snapshot = controller.fetch_state().await?;
//!     println!("scan phase: {:?}", snapshot.phase);
//!
//!     controller.request_start("n1").await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod clock;
pub mod controller;
pub mod error;
pub mod grid;
pub mod guard;
pub mod session;
pub mod view;

// Re-export commonly used types
pub use api::{
    ConfigSource, NetworkMapPayload, ScanApiClient, ScanService, ServerEndpointConfig,
    ServiceHandle, load_server_config,
};
pub use clock::{IDLE_RUNTIME, RuntimeClock, format_elapsed};
pub use controller::{MAP_REFRESH_INTERVAL, POLL_CEILING, POLL_INTERVAL, ScanController};
pub use error::ControlError;
pub use grid::{
    CellState, DeviceStatus, DeviceStatusRecord, GridCell, NetworkMapGrid, host_range_for_cidr,
    render_grid,
};
pub use guard::{GuardOutcome, RequestGuard, RequestKey};
pub use session::{Network, NetworkId, ScanPhase, ScanSnapshot, ScanStatePayload};
pub use view::{NullView, ViewHandle, ViewSink};
