//! Scan session model.
//!
//! The server is the source of truth for the scan lifecycle; the client holds
//! a [`ScanSnapshot`] that is replaced wholesale on every server response and
//! never patched field by field. Wire payloads are normalized here, at the
//! boundary, so the rest of the crate sees one canonical schema regardless of
//! the server's field casing.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub type NetworkId = String;

/// Discrete lifecycle state of the scan session.
///
/// Per user action the phase moves `Ready/Stopped -> Scanning -> Stopping ->
/// Ready/Stopped`; a requested stop never skips `Stopping`, and no transition
/// exists from `Stopping` directly back to `Scanning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    /// No scan is running and none has completed this session.
    Ready,
    Scanning,
    Stopping,
    /// No scan is running but a completed scan exists (`last_scan_at` set).
    Stopped,
}

impl ScanPhase {
    /// A settled phase accepts a new start and carries no in-flight work.
    pub fn is_settled(self) -> bool {
        matches!(self, ScanPhase::Ready | ScanPhase::Stopped)
    }

    pub fn is_active(self) -> bool {
        matches!(self, ScanPhase::Scanning | ScanPhase::Stopping)
    }
}

/// The client's view of the remote scan. Immutable once constructed; the
/// controller swaps whole snapshots so readers never observe a torn state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanSnapshot {
    pub phase: ScanPhase,
    pub selected_network: Option<NetworkId>,
    pub scan_count: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_scan_at: Option<DateTime<Utc>>,
}

impl ScanSnapshot {
    /// State shown before the first server response arrives.
    pub fn initial() -> Self {
        Self {
            phase: ScanPhase::Ready,
            selected_network: None,
            scan_count: 0,
            started_at: None,
            last_scan_at: None,
        }
    }

    /// Optimistic copy rendered while a stop request is in flight. The phase
    /// is forced to `Stopping` but `started_at` stays populated so the
    /// runtime clock keeps ticking instead of flickering back to ready.
    pub fn stopping_overlay(&self) -> Self {
        Self {
            phase: ScanPhase::Stopping,
            ..self.clone()
        }
    }
}

/// A network known to the directory service, used to populate the selector
/// and to validate `selected_network` references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    #[serde(alias = "ID")]
    pub id: NetworkId,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "CIDR", alias = "Cidr")]
    pub cidr: String,
}

/// Raw scan-state shape reported by the server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanStatePayload {
    #[serde(default, alias = "IsRunning")]
    pub is_running: bool,
    #[serde(default, alias = "IsStopping")]
    pub is_stopping: bool,
    #[serde(default, alias = "ScanCount", alias = "total_scans")]
    pub scan_count: u64,
    #[serde(default, alias = "StartTime", deserialize_with = "de_opt_timestamp")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, alias = "LastScanTime", deserialize_with = "de_opt_timestamp")]
    pub last_scan_time: Option<DateTime<Utc>>,
    #[serde(default, alias = "SelectedNetwork")]
    pub selected_network: Option<String>,
    #[serde(default, alias = "CurrentNetwork")]
    pub current_network: Option<String>,
}

impl ScanStatePayload {
    /// Normalize the wire flags into a canonical snapshot.
    ///
    /// Network priority: the network being scanned wins over a mere
    /// selection. `started_at` is kept only while the scan is active, which
    /// is what drives the runtime clock on and off.
    pub fn into_snapshot(self) -> ScanSnapshot {
        let phase = if self.is_stopping {
            ScanPhase::Stopping
        } else if self.is_running {
            ScanPhase::Scanning
        } else if self.last_scan_time.is_some() {
            ScanPhase::Stopped
        } else {
            ScanPhase::Ready
        };

        let selected_network = self
            .current_network
            .or(self.selected_network)
            .filter(|id| !id.is_empty());

        ScanSnapshot {
            phase,
            selected_network,
            scan_count: self.scan_count,
            started_at: if phase.is_active() { self.start_time } else { None },
            last_scan_at: self.last_scan_time,
        }
    }
}

/// Accepts RFC 3339 strings, `null`, the empty string, and the server's
/// zero-value timestamp (year 1), mapping everything non-meaningful to `None`.
fn de_opt_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(text) => {
            let parsed = DateTime::parse_from_rfc3339(text)
                .map_err(serde::de::Error::custom)?
                .with_timezone(&Utc);
            if parsed.year() <= 1 {
                Ok(None)
            } else {
                Ok(Some(parsed))
            }
        }
    }
}
