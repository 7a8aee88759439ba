//! # Drone Dashboard
//!
//! Live drone/ESC telemetry client.
//!
//! Connects to the telemetry WebSocket, keeps the connection alive, and logs
//! a periodic summary of the bounded series it aggregates.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::time::{interval, Duration};
use tracing::{error, info};

use drone_dashboard::config::Config;
use drone_dashboard::connection::{ConnectionManager, WsConnector};
use drone_dashboard::dashboard::{Dashboard, DashboardSnapshot};
use drone_dashboard::logging;
use drone_dashboard::telemetry::{TelemetryAggregator, TelemetryStore};

/// Configuration file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main entry point for the drone dashboard
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first CLI argument, or `config/default.toml`;
///      built-in defaults if that file does not exist)
///    - Set up logging
///    - Spawn the connection manager
///
/// 2. **Main Loop**
///    - Log connection status changes
///    - Log a snapshot summary every `snapshot_interval_ms`
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Cancel pending reconnects and close the socket
///    - Log ingest totals
///
/// # Errors
///
/// Returns error if the configuration cannot be loaded or validated.
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    let _log_guard = logging::init(&config.logging);

    info!("Drone Dashboard v{} starting...", env!("CARGO_PKG_VERSION"));

    let store = TelemetryStore::new(TelemetryAggregator::new(config.aggregator_settings()));
    let settings = config.manager_settings()?;
    let (manager, handle) = ConnectionManager::new(WsConnector, settings, store.clone());
    let manager_task = tokio::spawn(manager.run());

    let dashboard = Dashboard::new(handle.clone(), store);
    let mut status = handle.subscribe();
    let mut summary_interval = interval(Duration::from_millis(config.logging.snapshot_interval_ms));

    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    error!("Connection manager exited unexpectedly");
                    break;
                }
                info!("Status: {}", *status.borrow_and_update());
            }

            _ = summary_interval.tick() => {
                log_summary(&dashboard.snapshot());
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    dashboard.disconnect().await;
    if let Err(e) = manager_task.await {
        error!("Connection manager task failed: {}", e);
    }

    let stats = dashboard.snapshot().stats;
    info!(
        "Total messages: {} accepted, {} malformed, {} unrecognized",
        stats.accepted, stats.malformed, stats.unrecognized
    );

    Ok(())
}

fn load_config() -> Result<Config> {
    let explicit = std::env::args().nth(1);
    let path = explicit.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);

    if explicit.is_none() && !Path::new(path).exists() {
        let config = Config::default();
        config.validate()?;
        return Ok(config);
    }

    Config::load(path).with_context(|| format!("Failed to load configuration from {}", path))
}

fn log_summary(snapshot: &DashboardSnapshot) {
    let latest = |series: &drone_dashboard::telemetry::SeriesSnapshot, name: &str| {
        series
            .dataset(name)
            .and_then(|values| values.last().copied())
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "-".to_string())
    };

    info!(
        "{} [{}] ESC {} pts (V={} A={} RPM={}), telemetry {} pts (alt={} spd={}), position ({:.6}, {:.6})",
        snapshot.title,
        snapshot.status,
        snapshot.esc.len(),
        latest(&snapshot.esc, "Voltage"),
        latest(&snapshot.esc, "Current"),
        latest(&snapshot.esc, "RPM"),
        snapshot.telemetry.len(),
        latest(&snapshot.telemetry, "Altitude"),
        latest(&snapshot.telemetry, "Speed"),
        snapshot.position.latitude,
        snapshot.position.longitude,
    );
}
