//! Remote scan service interface.
//!
//! [`ScanService`] is the seam between the controller and the network: the
//! production implementation is [`ScanApiClient`] (reqwest against the scan
//! server's HTTP API); tests substitute a scripted implementation.

pub mod client;
pub mod config;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ControlError;
use crate::grid::{self, DeviceStatusRecord, NetworkMapGrid};
use crate::session::{Network, ScanStatePayload};

pub use client::ScanApiClient;
pub use config::{ConfigSource, ServerEndpointConfig, load_server_config};

/// Sparse network-map shape reported by the server. Field aliases absorb the
/// server's PascalCase on this endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkMapPayload {
    #[serde(default, alias = "BaseIP")]
    pub base_ip: String,
    #[serde(default, alias = "IPRange")]
    pub ip_range: Vec<u32>,
    #[serde(default, alias = "Devices")]
    pub devices: HashMap<String, DeviceStatusRecord>,
}

impl NetworkMapPayload {
    pub fn is_empty(&self) -> bool {
        self.base_ip.is_empty() || self.ip_range.is_empty()
    }

    /// Project the sparse map onto the full address range.
    pub fn render(&self) -> NetworkMapGrid {
        grid::render_grid(&self.base_ip, &self.ip_range, &self.devices)
    }
}

/// Operations the remote scan service exposes to the controller.
#[async_trait]
pub trait ScanService: Send + Sync {
    /// Current scan state.
    async fn scan_state(&self) -> Result<ScanStatePayload, ControlError>;

    /// Networks known to the directory service.
    async fn networks(&self) -> Result<Vec<Network>, ControlError>;

    /// Start scanning the given network; returns the updated state.
    async fn start_scan(&self, network_id: &str) -> Result<ScanStatePayload, ControlError>;

    /// Request a stop. `ControlError::Conflict` means nothing was running.
    async fn stop_scan(&self) -> Result<ScanStatePayload, ControlError>;

    /// Select a network without starting a scan. Acknowledgement only.
    async fn select_network(&self, network_id: &str) -> Result<(), ControlError>;

    /// Sparse device-by-address map for the selected network.
    async fn network_map(&self) -> Result<NetworkMapPayload, ControlError>;

    /// Device records for the device grid.
    async fn devices(&self) -> Result<Vec<DeviceStatusRecord>, ControlError>;
}

pub type ServiceHandle = Arc<dyn ScanService>;
