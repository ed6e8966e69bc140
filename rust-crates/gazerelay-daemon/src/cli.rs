//! Command-line interface

use clap::Parser;
use std::path::PathBuf;

use crate::config::{RelayConfig, SourceMode};

/// Gaze Relay - eye-tracking telemetry relay
#[derive(Parser, Debug)]
#[command(name = "gazerelay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: <config dir>/gazerelay/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Hardware backend
    #[arg(long, value_enum)]
    pub mode: Option<SourceMode>,

    /// Subscriber socket path
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Project Aria device identifier
    #[arg(long)]
    pub device_id: Option<String>,

    /// Pupil Remote host
    #[arg(long)]
    pub pupil_host: Option<String>,

    /// Pupil Remote port
    #[arg(long)]
    pub pupil_port: Option<u16>,

    /// Simulated sample rate
    #[arg(long)]
    pub hz: Option<f64>,

    /// Log level or filter directive (RUST_LOG takes precedence)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply(&self, config: &mut RelayConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(socket) = &self.socket {
            config.socket_path = Some(socket.clone());
        }
        if let Some(device_id) = &self.device_id {
            config.aria.device_id = Some(device_id.clone());
        }
        if let Some(host) = &self.pupil_host {
            config.pupil.host = host.clone();
        }
        if let Some(port) = self.pupil_port {
            config.pupil.remote_port = port;
        }
        if let Some(hz) = self.hz {
            config.simulate.hz = hz;
        }
    }
}
