use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::sync::{Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};

use crate::client::{Client, Subscriber};
use crate::error::{BroadcasterError, Result};
use crate::hub::StreamHub;

/// Default interval between liveness probes
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Default outbound queue length per subscriber
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 256;

/// Telemetry server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub ping_interval: Duration,
    pub subscriber_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            subscriber_queue: DEFAULT_SUBSCRIBER_QUEUE,
        }
    }
}

/// Unix socket server that turns every connection into a hub subscriber
pub struct TelemetryServer {
    socket_path: PathBuf,
    hub: StreamHub,
    config: ServerConfig,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    ping_task: Mutex<Option<JoinHandle<()>>>,
    running: Arc<RwLock<bool>>,
}

impl TelemetryServer {
    /// Create new server
    pub fn new(socket_path: impl AsRef<Path>, hub: StreamHub, config: ServerConfig) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            hub,
            config,
            accept_task: Mutex::new(None),
            ping_task: Mutex::new(None),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Start listening for subscribers
    pub async fn start(&self) -> Result<()> {
        let is_running = *self.running.read().await;
        if is_running {
            return Err(BroadcasterError::AlreadyRunning);
        }

        if let Some(parent) = self.socket_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(BroadcasterError::SocketPath(format!(
                    "Socket directory {} does not exist",
                    parent.display()
                )));
            }
        }

        // Remove existing socket file
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Set secure permissions (0600 = owner-only access)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if self.socket_path.exists() {
                let permissions = std::fs::Permissions::from_mode(0o600);
                std::fs::set_permissions(&self.socket_path, permissions)?;
            }
        }

        tracing::info!("Telemetry server started on {:?} (permissions: 0600)", self.socket_path);

        *self.running.write().await = true;

        let hub = self.hub.clone();
        let queue = self.config.subscriber_queue;
        let running = Arc::clone(&self.running);

        let accept = tokio::spawn(async move {
            // Dropping the set aborts every connection task
            let mut connections = JoinSet::new();

            loop {
                if !*running.read().await {
                    break;
                }

                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _addr)) => {
                            let (subscriber, outbound) = Subscriber::channel(queue);
                            match hub.register(subscriber) {
                                Ok(id) => {
                                    let hub = hub.clone();
                                    connections.spawn(Client::new(stream).run(id, outbound, hub));
                                }
                                Err(e) => tracing::warn!("Failed to register client: {}", e),
                            }
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept client: {}", e);
                        }
                    },
                    Some(_) = connections.join_next(), if !connections.is_empty() => {}
                }
            }
            tracing::info!("Client acceptance task stopped");
        });

        let hub = self.hub.clone();
        let interval = self.config.ping_interval;
        let ping = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match hub.ping_all() {
                    Ok(report) if report.pruned > 0 => {
                        tracing::info!("Ping pruned {} dead subscriber(s)", report.pruned)
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("Failed to send ping: {}", e),
                }
            }
        });

        *self.accept_task.lock().await = Some(accept);
        *self.ping_task.lock().await = Some(ping);

        Ok(())
    }

    /// Stop the server and close all subscriber connections
    pub async fn stop(&self) -> Result<()> {
        let is_running = *self.running.read().await;
        if !is_running {
            return Err(BroadcasterError::NotStarted);
        }

        *self.running.write().await = false;

        if let Some(task) = self.accept_task.lock().await.take() {
            task.abort();
        }
        if let Some(task) = self.ping_task.lock().await.take() {
            task.abort();
        }

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        tracing::info!("Telemetry server stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub fn hub(&self) -> &StreamHub {
        &self.hub
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for TelemetryServer {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.get_mut().take() {
            task.abort();
        }
        if let Some(task) = self.ping_task.get_mut().take() {
            task.abort();
        }
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_server_create() {
        let dir = tempdir().unwrap();
        let server = TelemetryServer::new(dir.path().join("t.sock"), StreamHub::new(4), ServerConfig::default());
        assert!(!server.is_running().await);
        assert_eq!(server.hub().client_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let dir = tempdir().unwrap();
        let server = TelemetryServer::new(dir.path().join("t.sock"), StreamHub::new(4), ServerConfig::default());
        assert!(matches!(server.stop().await, Err(BroadcasterError::NotStarted)));
    }

    #[tokio::test]
    async fn test_double_start() {
        let dir = tempdir().unwrap();
        let server = TelemetryServer::new(dir.path().join("t.sock"), StreamHub::new(4), ServerConfig::default());
        server.start().await.unwrap();
        assert!(matches!(server.start().await, Err(BroadcasterError::AlreadyRunning)));
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_socket_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("t.sock");
        let server = TelemetryServer::new(path, StreamHub::new(4), ServerConfig::default());
        assert!(matches!(server.start().await, Err(BroadcasterError::SocketPath(_))));
    }
}
