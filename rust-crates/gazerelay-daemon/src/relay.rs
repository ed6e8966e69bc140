//! Source → relay → hub → socket wiring

use anyhow::{Context, Result};
use gazerelay_broadcaster::{RelayBroadcaster, StreamHub, TelemetryServer};
use gazerelay_sources::{
    AriaSource, PupilSource, SimulatedSource, SourceExit, SourceWorker, TcpGazeBridge,
};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{RelayConfig, SourceMode};
use crate::socket_utils;

/// How long to wait for queued telemetry to reach the hub after the source stops
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// One relay session: a source adapter feeding the subscriber socket
pub struct GazeRelay {
    config: RelayConfig,
    socket_path: PathBuf,
    hub: StreamHub,
}

impl GazeRelay {
    pub fn new(config: RelayConfig) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let socket_path = socket_utils::resolve_socket_path(config.socket_path.as_deref())
            .context("Failed to resolve telemetry socket path")?;
        let hub = StreamHub::new(config.hub.history_capacity);

        Ok(Self {
            config,
            socket_path,
            hub,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn hub(&self) -> &StreamHub {
        &self.hub
    }

    /// Run until the source finishes or fails, or `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<SourceExit>
    where
        F: Future<Output = ()>,
    {
        let server = TelemetryServer::new(&self.socket_path, self.hub.clone(), self.config.server_config());
        server
            .start()
            .await
            .with_context(|| format!("Failed to start telemetry server on {}", self.socket_path.display()))?;

        let (broadcaster, drain) = RelayBroadcaster::spawn(self.hub.clone());

        let mut worker = match self.start_worker(broadcaster).await {
            Ok(worker) => worker,
            Err(e) => {
                if let Err(stop_err) = server.stop().await {
                    warn!("Failed to stop telemetry server: {}", stop_err);
                }
                return Err(e);
            }
        };

        info!("🚀 Gaze relay ready ({} source → {})", worker.name(), self.socket_path.display());

        let outcome = tokio::select! {
            result = worker.result() => Some(result),
            _ = shutdown => {
                info!("🛑 Received shutdown signal");
                None
            }
        };

        if let Err(e) = worker.stop().await {
            warn!("{} source did not shut down cleanly: {}", worker.name(), e);
        }
        let stats = worker.stats();
        info!(
            "{} source forwarded {} samples ({} malformed dropped)",
            worker.name(),
            stats.forwarded,
            stats.malformed
        );
        let name = worker.name();
        drop(worker);

        match tokio::time::timeout(DRAIN_TIMEOUT, drain).await {
            Ok(Ok(forwarded)) => info!("Relay drained {} events", forwarded),
            Ok(Err(e)) => warn!("Relay drain task failed: {}", e),
            Err(_) => warn!("Relay drain did not finish within {:?}", DRAIN_TIMEOUT),
        }

        server.stop().await.context("Failed to stop telemetry server")?;

        match outcome {
            None => Ok(SourceExit::Cancelled),
            Some(result) => result.with_context(|| format!("{} source failed", name)),
        }
    }

    async fn start_worker(&self, broadcaster: RelayBroadcaster) -> Result<SourceWorker> {
        let worker_config = self.config.worker_config();

        let worker = match self.config.mode {
            SourceMode::Simulate => {
                let source = SimulatedSource::new(self.config.simulated_config())
                    .context("Invalid simulated source settings")?;
                SourceWorker::start(source, broadcaster, worker_config).await
            }
            SourceMode::Pupil => {
                let source = PupilSource::new(self.config.pupil_config())
                    .context("Invalid Pupil Core settings")?;
                SourceWorker::start(source, broadcaster, worker_config).await
            }
            SourceMode::Aria => {
                let bridge = TcpGazeBridge::new(self.config.aria.bridge_addr.clone());
                let source = AriaSource::new(bridge, self.config.aria_config())
                    .context("Invalid Aria settings")?;
                SourceWorker::start(source, broadcaster, worker_config).await
            }
        };

        worker.with_context(|| format!("Failed to start {:?} source", self.config.mode))
    }
}
