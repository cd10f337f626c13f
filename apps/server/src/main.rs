//! Spindeck Server - standalone headless server for collaborative DJ rooms.
//!
//! Hosts the room engine behind an HTTP/WebSocket endpoint. Designed to run
//! as a background daemon: YAML config, env overrides, signal-based
//! shutdown.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use spindeck_core::{bootstrap_default, start_server, AppState};
use tokio::signal;

use crate::config::ServerConfig;

/// Spindeck Server - realtime backend for collaborative DJ rooms.
#[derive(Parser, Debug)]
#[command(name = "spindeck-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SPINDECK_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "SPINDECK_BIND_PORT")]
    port: Option<u16>,

    /// Data directory for room snapshots.
    #[arg(short = 'd', long, env = "SPINDECK_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Spindeck Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }

    if let Some(ref data_dir) = config.data_dir {
        log::info!("Using data directory: {}", data_dir.display());
    } else {
        log::info!("No data directory configured - rooms will not survive restarts");
    }

    // Bootstrap the engine (restores persisted rooms when a data dir is set)
    let services = bootstrap_default(config.to_engine_config(), config.data_dir.as_deref())
        .context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    if let Ok(ip) = local_ip_address::local_ip() {
        log::info!("Invite clients via ws://{}:{}/ws", ip, config.bind_port);
    }

    // Build app state for the HTTP server
    let app_state = AppState::new(
        services.engine.clone(),
        services.ws_manager.clone(),
        config.to_api_config(),
    );

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {e}");
        }
    });

    log::info!("HTTP server started on port {}", config.bind_port);

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Graceful shutdown: final snapshots, then stop accepting traffic
    services.shutdown();
    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
