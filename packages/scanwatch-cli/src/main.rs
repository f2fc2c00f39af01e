//! Scanwatch CLI - headless dashboard for a remote network-scanning service
//!
//! This binary drives the scan session controller without a browser:
//! - Inspect scan state and the network list
//! - Start/stop scans and select the target network
//! - Render the network map as a text grid
//! - Run a live dashboard loop (for terminals and tmux panes)

mod watch;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use scanwatch_core::{
    CellState, NetworkMapGrid, NullView, POLL_CEILING, POLL_INTERVAL, ScanApiClient,
    ScanController, ScanService, api, host_range_for_cidr, render_grid,
};

#[derive(Parser)]
#[command(name = "scanwatch")]
#[command(version)]
#[command(about = "Headless dashboard for a remote network-scanning service")]
#[command(long_about = "
Scanwatch talks to a remote scan server: it starts and stops scans, waits for
asynchronous stops to actually settle, and renders the network map without a
browser.

Quick start:
  1. List networks:   scanwatch networks
  2. Start a scan:    scanwatch start <network-id>
  3. Live dashboard:  scanwatch watch

Point it at a server with SCANWATCH_SERVER_URL or ~/.config/scanwatch/config.toml.
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the current scan state
    Status,

    /// List networks known to the scan server
    Networks,

    /// Start scanning a network
    Start {
        /// Network identifier (see `scanwatch networks`)
        network_id: String,
    },

    /// Stop the running scan and wait for it to settle
    Stop,

    /// Select the target network without starting a scan
    Select {
        /// Network identifier
        network_id: String,
    },

    /// Render the network map as a text grid
    Map,

    /// Run a live dashboard loop
    Watch {
        /// State refresh interval in seconds
        #[arg(short, long, default_value = "5")]
        interval: u64,
    },

    /// Show configuration paths and settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("scanwatch={log_level},scanwatch_core={log_level}").into()
            }),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Status => cmd_status(&cli).await,
        Commands::Networks => cmd_networks(&cli).await,
        Commands::Start { ref network_id } => cmd_start(&cli, network_id).await,
        Commands::Stop => cmd_stop(&cli).await,
        Commands::Select { ref network_id } => cmd_select(&cli, network_id).await,
        Commands::Map => cmd_map(&cli).await,
        Commands::Watch { interval } => watch::run_watch(interval).await,
        Commands::Config => cmd_config(&cli).await,
    }
}

fn client() -> Result<ScanApiClient> {
    ScanApiClient::from_config().context("Failed to build scan service client")
}

fn controller() -> Result<Arc<ScanController>> {
    Ok(ScanController::new(Arc::new(client()?), Arc::new(NullView)))
}

async fn cmd_status(cli: &Cli) -> Result<()> {
    let controller = controller()?;
    controller.refresh_networks().await?;
    let snapshot = controller.fetch_state().await?;

    match cli.format {
        OutputFormat::Text => {
            println!("Phase:    {:?}", snapshot.phase);
            println!(
                "Network:  {}",
                snapshot.selected_network.as_deref().unwrap_or("-")
            );
            println!("Scans:    {}", snapshot.scan_count);
            match snapshot.started_at {
                Some(started_at) => println!(
                    "Runtime:  {}",
                    scanwatch_core::format_elapsed(started_at, chrono::Utc::now())
                ),
                None => println!("Runtime:  {}", scanwatch_core::IDLE_RUNTIME),
            }
            println!(
                "Last scan: {}",
                snapshot
                    .last_scan_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string())
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }
    Ok(())
}

async fn cmd_networks(cli: &Cli) -> Result<()> {
    let networks = client()?.networks().await?;

    match cli.format {
        OutputFormat::Text => {
            if networks.is_empty() {
                println!("No networks configured on the server.");
                return Ok(());
            }
            for network in &networks {
                println!("  {:24} {:20} {}", network.id, network.name, network.cidr);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&networks)?);
        }
    }
    Ok(())
}

async fn cmd_start(cli: &Cli, network_id: &str) -> Result<()> {
    let controller = controller()?;
    controller.refresh_networks().await.ok();
    let snapshot = controller.request_start(network_id).await?;

    match cli.format {
        OutputFormat::Text => {
            println!("Scan started on network '{network_id}' (phase: {:?})", snapshot.phase);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }
    Ok(())
}

async fn cmd_stop(cli: &Cli) -> Result<()> {
    let controller = controller()?;
    controller.fetch_state().await?;
    let mut updates = controller.subscribe();
    controller.request_stop().await?;

    // Wait out the convergence poller (plus slack for the final refresh).
    let deadline = POLL_INTERVAL * POLL_CEILING + Duration::from_secs(5);
    let settled = tokio::time::timeout(deadline, async {
        loop {
            if updates.borrow_and_update().phase.is_settled() {
                break;
            }
            if updates.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .is_ok();

    let snapshot = controller.snapshot().await;
    match cli.format {
        OutputFormat::Text => {
            if settled {
                println!("Scan stopped (phase: {:?})", snapshot.phase);
            } else {
                println!(
                    "Stop requested but not confirmed; last phase: {:?}",
                    snapshot.phase
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }
    Ok(())
}

async fn cmd_select(cli: &Cli, network_id: &str) -> Result<()> {
    let controller = controller()?;
    controller.select_network(network_id).await?;

    match cli.format {
        OutputFormat::Text => println!("Network '{network_id}' selected"),
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "selected": network_id }));
        }
    }
    Ok(())
}

async fn cmd_map(cli: &Cli) -> Result<()> {
    let client = client()?;
    let payload = client.network_map().await?;

    let grid = if payload.is_empty() {
        // Before the first scan the server reports no map; fall back to the
        // selected network's address space, rendered all-available.
        cidr_fallback_grid(&client).await?
    } else {
        Some(payload.render())
    };

    match grid {
        Some(grid) => match cli.format {
            OutputFormat::Text => print!("{}", render_map_text(&grid)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&grid)?),
        },
        None => match cli.format {
            OutputFormat::Text => {
                println!("No devices detected. Start a scan to populate the network map.");
            }
            OutputFormat::Json => println!("{}", serde_json::json!({ "cells": [] })),
        },
    }
    Ok(())
}

/// Empty grid over the selected network's CIDR, for `map` before the server
/// has a device map to report.
async fn cidr_fallback_grid(client: &ScanApiClient) -> Result<Option<NetworkMapGrid>> {
    let snapshot = client.scan_state().await?.into_snapshot();
    let Some(selected) = snapshot.selected_network else {
        return Ok(None);
    };
    let networks = client.networks().await?;
    Ok(networks
        .into_iter()
        .find(|n| n.id == selected)
        .and_then(|n| host_range_for_cidr(&n.cidr))
        .map(|(prefix, suffixes)| render_grid(&prefix, &suffixes, &HashMap::new())))
}

async fn cmd_config(cli: &Cli) -> Result<()> {
    let server_config = api::load_server_config();
    let config_path = api::config::get_config_file_path_string();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:  {config_path}");
            println!(
                "Server URL:   {} (from {})",
                server_config.url, server_config.source
            );
            println!();
            println!("Environment variables:");
            println!("  SCANWATCH_SERVER_URL - Override server URL");
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", api::config::generate_example_config());
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "config_file": config_path,
                    "server_url": server_config.url,
                    "server_url_source": format!("{}", server_config.source),
                })
            );
        }
    }
    Ok(())
}

/// One character per address cell, 32 cells per row.
pub fn render_map_text(grid: &NetworkMapGrid) -> String {
    let mut out = format!("Network map ({}.0/24)\n", grid.base_prefix);
    for row in grid.cells.chunks(32) {
        let line: String = row
            .iter()
            .map(|cell| match cell.state {
                CellState::Online => '#',
                CellState::Idle => 'o',
                CellState::Offline => 'x',
                CellState::Available => '.',
            })
            .collect();
        out.push_str("  ");
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str("  # online   o idle   x offline   . available\n");
    out
}
