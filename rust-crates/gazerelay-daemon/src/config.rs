//! Configuration management

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use gazerelay_broadcaster::ServerConfig;
use gazerelay_sources::{AriaConfig, BlinkSignal, PupilConfig, SimulatedConfig, WorkerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted when no Aria device id is configured
pub const ARIA_DEVICE_ID_ENV: &str = "ARIA_DEVICE_ID";

/// Which hardware backend feeds the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    #[default]
    Simulate,
    Pupil,
    Aria,
}

/// Blink detector settings shared by all backends
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkSection {
    /// Minimum time closed before the detector may reopen
    pub hold_ms: f64,
}

impl Default for BlinkSection {
    fn default() -> Self {
        Self { hold_ms: 120.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulateSection {
    pub hz: f64,
    pub blink_interval_s: f64,
    /// Stop after this many samples (unset = run forever)
    pub max_samples: Option<u64>,
}

impl Default for SimulateSection {
    fn default() -> Self {
        Self {
            hz: 120.0,
            blink_interval_s: 2.0,
            max_samples: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PupilSection {
    pub host: String,
    pub remote_port: u16,
    /// Topic prefix ("surfaces." for surface-mapped gaze, "gaze." for raw gaze)
    pub topic: String,
    pub surface_name: String,
    pub confidence_threshold: f64,
    pub blink_signal: BlinkSignal,
    pub close_confidence: f64,
    pub open_confidence: f64,
    pub confidence_ema_alpha: f64,
    pub handshake_timeout_ms: u64,
}

impl Default for PupilSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            remote_port: 50020,
            topic: "surfaces.".to_string(),
            surface_name: "screen".to_string(),
            confidence_threshold: 0.6,
            blink_signal: BlinkSignal::Confidence,
            close_confidence: 0.35,
            open_confidence: 0.55,
            confidence_ema_alpha: 0.4,
            handshake_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AriaSection {
    pub device_id: Option<String>,
    /// Companion streamer forwarding eye-gaze records
    pub bridge_addr: String,
    pub max_angle_deg: f64,
    pub close_depth_m: f64,
    pub open_depth_m: f64,
    pub depth_ema_alpha: f64,
}

impl Default for AriaSection {
    fn default() -> Self {
        Self {
            device_id: None,
            bridge_addr: gazerelay_sources::aria::DEFAULT_BRIDGE_ADDR.to_string(),
            max_angle_deg: 35.0,
            close_depth_m: 0.02,
            open_depth_m: 0.05,
            depth_ema_alpha: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSection {
    pub history_capacity: usize,
    pub ping_interval_s: u64,
    pub subscriber_queue: usize,
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            history_capacity: 1024,
            ping_interval_s: 30,
            subscriber_queue: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    pub poll_timeout_ms: u64,
    pub join_timeout_s: u64,
    pub diagnostics_interval_s: u64,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 100,
            join_timeout_s: 5,
            diagnostics_interval_s: 5,
        }
    }
}

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    pub mode: SourceMode,

    /// Subscriber socket (unset = $XDG_RUNTIME_DIR/gazerelay.sock)
    pub socket_path: Option<PathBuf>,

    pub blink: BlinkSection,
    pub simulate: SimulateSection,
    pub pupil: PupilSection,
    pub aria: AriaSection,
    pub hub: HubSection,
    pub source: SourceSection,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            mode: SourceMode::default(),
            socket_path: None,
            blink: BlinkSection::default(),
            simulate: SimulateSection::default(),
            pupil: PupilSection::default(),
            aria: AriaSection::default(),
            hub: HubSection::default(),
            source: SourceSection::default(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from the default location, or create it
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_config_path())
    }

    /// Load configuration from `path`, writing defaults there on first run
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;

            let mut config: RelayConfig = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;

            config.config_path = path.to_path_buf();
            Ok(config)
        } else {
            let config = Self {
                config_path: path.to_path_buf(),
                ..Self::default()
            };
            config.save().context("Failed to save default config")?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Fill a missing Aria device id from the environment
    pub fn apply_env(&mut self) {
        let missing = self
            .aria
            .device_id
            .as_deref()
            .map_or(true, |id| id.trim().is_empty());
        if missing {
            if let Ok(id) = std::env::var(ARIA_DEVICE_ID_ENV) {
                if !id.trim().is_empty() {
                    self.aria.device_id = Some(id);
                }
            }
        }
    }

    /// Reject settings that would leave the relay unusable
    pub fn validate(&self) -> Result<()> {
        if self.hub.history_capacity == 0 {
            bail!("hub.history_capacity must be at least 1");
        }
        if self.hub.subscriber_queue == 0 {
            bail!("hub.subscriber_queue must be at least 1");
        }
        if self.hub.ping_interval_s == 0 {
            bail!("hub.ping_interval_s must be at least 1");
        }
        if self.source.poll_timeout_ms == 0 {
            bail!("source.poll_timeout_ms must be at least 1");
        }
        if !self.simulate.blink_interval_s.is_finite() || self.simulate.blink_interval_s <= 0.0 {
            bail!("simulate.blink_interval_s must be positive");
        }
        Ok(())
    }

    pub fn simulated_config(&self) -> SimulatedConfig {
        SimulatedConfig {
            hz: self.simulate.hz,
            blink_interval: Duration::try_from_secs_f64(self.simulate.blink_interval_s)
                .unwrap_or(gazerelay_sources::simulated::DEFAULT_BLINK_INTERVAL),
            max_samples: self.simulate.max_samples,
        }
    }

    pub fn pupil_config(&self) -> PupilConfig {
        PupilConfig {
            host: self.pupil.host.clone(),
            remote_port: self.pupil.remote_port,
            topic: self.pupil.topic.clone(),
            surface_name: self.pupil.surface_name.clone(),
            confidence_threshold: self.pupil.confidence_threshold,
            blink_signal: self.pupil.blink_signal,
            close_confidence: self.pupil.close_confidence,
            open_confidence: self.pupil.open_confidence,
            confidence_ema_alpha: self.pupil.confidence_ema_alpha,
            hold_ms: self.blink.hold_ms,
            handshake_timeout: Duration::from_millis(self.pupil.handshake_timeout_ms),
        }
    }

    pub fn aria_config(&self) -> AriaConfig {
        AriaConfig {
            device_id: self.aria.device_id.clone(),
            max_angle_deg: self.aria.max_angle_deg,
            close_depth_m: self.aria.close_depth_m,
            open_depth_m: self.aria.open_depth_m,
            depth_ema_alpha: self.aria.depth_ema_alpha,
            hold_ms: self.blink.hold_ms,
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_timeout: Duration::from_millis(self.source.poll_timeout_ms),
            join_timeout: Duration::from_secs(self.source.join_timeout_s),
            diagnostics_interval: Duration::from_secs(self.source.diagnostics_interval_s),
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            ping_interval: Duration::from_secs(self.hub.ping_interval_s),
            subscriber_queue: self.hub.subscriber_queue,
        }
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("com.gazerelay.daemon")
        } else {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("gazerelay")
        };

        config_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_first_run_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = RelayConfig::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.config_path, path);
        assert_eq!(config.mode, SourceMode::Simulate);

        let reloaded = RelayConfig::load_from(&path).unwrap();
        assert_eq!(reloaded.hub.history_capacity, 1024);
        assert_eq!(reloaded.pupil.remote_port, 50020);
        assert_eq!(reloaded.pupil.blink_signal, BlinkSignal::Confidence);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "mode = \"pupil\"\n\n[pupil]\nhost = \"10.0.0.5\"\nblink_signal = \"markers\"\n\n[hub]\nhistory_capacity = 16\n",
        )
        .unwrap();

        let config = RelayConfig::load_from(&path).unwrap();
        assert_eq!(config.mode, SourceMode::Pupil);
        assert_eq!(config.pupil.host, "10.0.0.5");
        assert_eq!(config.pupil.blink_signal, BlinkSignal::Markers);
        assert_eq!(config.pupil.topic, "surfaces.");
        assert_eq!(config.hub.history_capacity, 16);
        assert_eq!(config.hub.ping_interval_s, 30);
        assert_eq!(config.aria.max_angle_deg, 35.0);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "mode = \"webcam\"\n").unwrap();
        assert!(RelayConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = RelayConfig::default();
        assert!(config.validate().is_ok());

        config.hub.history_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_configs_share_hold() {
        let mut config = RelayConfig::default();
        config.blink.hold_ms = 250.0;
        assert_eq!(config.pupil_config().hold_ms, 250.0);
        assert_eq!(config.aria_config().hold_ms, 250.0);
        assert_eq!(config.worker_config().poll_timeout, Duration::from_millis(100));
        assert_eq!(config.server_config().ping_interval, Duration::from_secs(30));
        assert_eq!(config.simulated_config().blink_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_default_config_path() {
        let path = RelayConfig::default_config_path();
        assert!(path.ends_with("config.toml"));
    }
}
