//! Gaze Relay daemon
//!
//! Reads eye-tracking telemetry from one hardware backend and streams it as
//! newline-delimited JSON to every client of a Unix socket.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gazerelay_daemon::cli::Cli;
use gazerelay_daemon::{GazeRelay, RelayConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();

    info!("👁️ Starting Gaze Relay v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => RelayConfig::load_from(path),
        None => RelayConfig::load(),
    }
    .context("Failed to load configuration")?;
    info!("📋 Configuration loaded from {}", config.config_path.display());

    cli.apply(&mut config);
    config.apply_env();

    let relay = GazeRelay::new(config).context("Failed to initialize relay")?;
    info!("🔌 Telemetry socket: {}", relay.socket_path().display());

    let exit = relay
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("👋 Gaze relay stopped ({:?})", exit);
    Ok(())
}
