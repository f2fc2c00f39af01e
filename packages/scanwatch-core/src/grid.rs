//! Network map grid projection.
//!
//! Projects the server's sparse address-to-device map onto a contiguous,
//! enumerable address range. Rendering is a pure function of its inputs:
//! identical inputs always produce an identical cell sequence, so the grid is
//! safe to rebuild in full on every refresh tick without accumulating drift.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Server-reported liveness of a discovered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Idle,
    Offline,
    #[serde(other)]
    Unknown,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        DeviceStatus::Unknown
    }
}

/// One discovered IP. Owned by the server; the client holds a read-only
/// snapshot valid until the next map refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatusRecord {
    #[serde(alias = "IPv4", alias = "ip")]
    pub ipv4: String,
    #[serde(default, alias = "Status")]
    pub status: DeviceStatus,
    #[serde(default, alias = "ID", alias = "id")]
    pub device_id: Option<String>,
}

/// Visual state of one grid cell. `Available` means the address was never
/// observed, which is deliberately distinct from an observed-offline device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellState {
    Online,
    Idle,
    Offline,
    Available,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridCell {
    pub address: String,
    pub state: CellState,
    pub device_id: Option<String>,
}

/// Derived, ephemeral view of one network's address space. Regenerated in
/// full on every refresh; never patched incrementally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkMapGrid {
    pub base_prefix: String,
    pub cells: Vec<GridCell>,
}

impl NetworkMapGrid {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Render one cell per host suffix, in suffix order.
///
/// A present record maps by its status; `unknown` buckets with offline (the
/// dashboard draws them identically). An absent address renders `Available`.
pub fn render_grid(
    base_prefix: &str,
    suffixes: &[u32],
    devices: &HashMap<String, DeviceStatusRecord>,
) -> NetworkMapGrid {
    let cells = suffixes
        .iter()
        .map(|suffix| {
            let address = format!("{base_prefix}.{suffix}");
            match devices.get(&address) {
                Some(record) => GridCell {
                    state: match record.status {
                        DeviceStatus::Online => CellState::Online,
                        DeviceStatus::Idle => CellState::Idle,
                        DeviceStatus::Offline | DeviceStatus::Unknown => CellState::Offline,
                    },
                    device_id: record.device_id.clone(),
                    address,
                },
                None => GridCell {
                    address,
                    state: CellState::Available,
                    device_id: None,
                },
            }
        })
        .collect();

    NetworkMapGrid {
        base_prefix: base_prefix.to_string(),
        cells,
    }
}

/// Derive a `(base prefix, host suffixes)` pair from a network CIDR, for
/// rendering a map before the server has reported one.
///
/// Networks wider than /24 are capped at 254 hosts on the first /24 slice;
/// network and broadcast addresses are excluded.
pub fn host_range_for_cidr(cidr: &str) -> Option<(String, Vec<u32>)> {
    let network: ipnetwork::Ipv4Network = cidr.trim().parse().ok()?;
    let base = network.network().octets();
    let base_prefix = format!("{}.{}.{}", base[0], base[1], base[2]);

    // Sized without `Ipv4Network::size()`, which overflows u32 on a /0.
    let (first, host_count) = match network.prefix() {
        // /31 and /32 carry no network/broadcast addresses to exclude.
        prefix @ 31..=32 => (u32::from(base[3]), 1u32 << (32 - prefix)),
        // Wider than /24: render the first /24 slice.
        0..=23 => (1, 254),
        prefix => {
            let usable = (1u32 << (32 - prefix)) - 2;
            (u32::from(base[3]) + 1, usable)
        }
    };

    let suffixes = (first..first + host_count).collect();
    Some((base_prefix, suffixes))
}
