use async_trait::async_trait;
use std::time::Duration;

use crate::api::{NetworkMapPayload, ScanService};
use crate::error::ControlError;
use crate::grid::DeviceStatusRecord;
use crate::session::{Network, ScanStatePayload};

/// Per-request transport timeout. The request guard enforces its own tighter
/// deadlines; this bound makes sure an abandoned request also tears down the
/// underlying connection.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the remote scan service.
#[derive(Debug, Clone)]
pub struct ScanApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ScanApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ControlError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ControlError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Client pointed at the configured endpoint (env var > config file >
    /// default).
    pub fn from_config() -> Result<Self, ControlError> {
        let config = crate::api::config::load_server_config();
        tracing::debug!(
            "scan service endpoint {} (from {})",
            config.url,
            config.source
        );
        Self::new(config.url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Map a non-success status to the controller taxonomy. 409 is the server's
/// "nothing to stop" answer and gets its own variant so callers can treat it
/// as a user notice rather than a failure.
fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ControlError> {
    match resp.status().as_u16() {
        409 => Err(ControlError::Conflict),
        _ if resp.status().is_success() => Ok(resp),
        status => Err(ControlError::Transport(format!(
            "server returned {status}"
        ))),
    }
}

#[async_trait]
impl ScanService for ScanApiClient {
    async fn scan_state(&self) -> Result<ScanStatePayload, ControlError> {
        let resp = self.http.get(self.url("/api/scan/status")).send().await?;
        Ok(check_status(resp)?.json::<ScanStatePayload>().await?)
    }

    async fn networks(&self) -> Result<Vec<Network>, ControlError> {
        let resp = self.http.get(self.url("/api/networks")).send().await?;
        Ok(check_status(resp)?.json::<Vec<Network>>().await?)
    }

    async fn start_scan(&self, network_id: &str) -> Result<ScanStatePayload, ControlError> {
        let resp = self
            .http
            .post(self.url("/api/scan/start"))
            .form(&[("network-selector", network_id)])
            .send()
            .await?;
        Ok(check_status(resp)?.json::<ScanStatePayload>().await?)
    }

    async fn stop_scan(&self) -> Result<ScanStatePayload, ControlError> {
        let resp = self.http.post(self.url("/api/scan/stop")).send().await?;
        Ok(check_status(resp)?.json::<ScanStatePayload>().await?)
    }

    async fn select_network(&self, network_id: &str) -> Result<(), ControlError> {
        let resp = self
            .http
            .post(self.url("/api/scan/select-network"))
            .form(&[("network-id", network_id)])
            .send()
            .await?;
        check_status(resp)?;
        Ok(())
    }

    async fn network_map(&self) -> Result<NetworkMapPayload, ControlError> {
        let resp = self.http.get(self.url("/api/network-map")).send().await?;
        Ok(check_status(resp)?.json::<NetworkMapPayload>().await?)
    }

    async fn devices(&self) -> Result<Vec<DeviceStatusRecord>, ControlError> {
        let resp = self.http.get(self.url("/api/devices")).send().await?;
        Ok(check_status(resp)?.json::<Vec<DeviceStatusRecord>>().await?)
    }
}
