//! Dedicated worker thread driving a [`SourceAdapter`]
//!
//! The thread blocks on hardware I/O and hands every event to the
//! [`RelayBroadcaster`]. The async side only sees `start`, `stop` and `result`.

use gazerelay_broadcaster::{RelayBroadcaster, TelemetryEvent};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::adapter::{Polled, SourceAdapter};
use crate::error::{Result, SourceError};

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_DIAGNOSTICS_INTERVAL: Duration = Duration::from_secs(5);

/// Worker loop timing
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Upper bound on one poll, and so on how long a stop request goes unnoticed
    pub poll_timeout: Duration,
    /// How long `stop` waits for the thread to finish
    pub join_timeout: Duration,
    pub diagnostics_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            diagnostics_interval: DEFAULT_DIAGNOSTICS_INTERVAL,
        }
    }
}

/// Adapter lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdapterState {
    Idle = 0,
    Connecting = 1,
    Streaming = 2,
    Stopping = 3,
    Stopped = 4,
}

impl AdapterState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Connecting,
            2 => Self::Streaming,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// How a worker finished when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceExit {
    /// The source ran out of data
    Finished,
    /// Stopped on request, or the relay went away
    Cancelled,
}

/// Cumulative worker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub forwarded: u64,
    pub malformed: u64,
}

struct Shared {
    stop: AtomicBool,
    state: AtomicU8,
    forwarded: AtomicU64,
    malformed: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
            state: AtomicU8::new(AdapterState::Idle as u8),
            forwarded: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
        }
    }

    fn set_state(&self, state: AdapterState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn state(&self) -> AdapterState {
        AdapterState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Per-window counters for the periodic summary log
struct Diagnostics {
    interval: Duration,
    window_start: Instant,
    forwarded: u64,
    malformed: u64,
}

impl Diagnostics {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            window_start: Instant::now(),
            forwarded: 0,
            malformed: 0,
        }
    }

    fn maybe_log(&mut self, name: &str) {
        let elapsed = self.window_start.elapsed();
        if elapsed < self.interval {
            return;
        }
        info!(
            "{} source forwarded {} samples in {:.1}s ({} malformed dropped)",
            name,
            self.forwarded,
            elapsed.as_secs_f64(),
            self.malformed
        );
        self.window_start = Instant::now();
        self.forwarded = 0;
        self.malformed = 0;
    }
}

/// Handle to a running source adapter thread
pub struct SourceWorker {
    name: &'static str,
    shared: Arc<Shared>,
    thread: Option<std::thread::JoinHandle<()>>,
    outcome: Option<oneshot::Receiver<Result<SourceExit>>>,
    join_timeout: Duration,
}

impl SourceWorker {
    /// Spawn the worker thread and wait for the adapter handshake.
    ///
    /// A connection failure is returned here and the thread exits on its own.
    pub async fn start<A: SourceAdapter>(
        adapter: A,
        broadcaster: RelayBroadcaster,
        config: WorkerConfig,
    ) -> Result<Self> {
        let name = adapter.name();
        let shared = Arc::new(Shared::new());
        let (connected_tx, connected_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let join_timeout = config.join_timeout;

        let thread = std::thread::Builder::new()
            .name(format!("{}-source", name))
            .spawn({
                let shared = Arc::clone(&shared);
                move || run(adapter, broadcaster, config, shared, connected_tx, outcome_tx)
            })?;

        match connected_rx.await {
            Ok(Ok(())) => Ok(Self {
                name,
                shared,
                thread: Some(thread),
                outcome: Some(outcome_rx),
                join_timeout,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SourceError::WorkerLost),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> AdapterState {
        self.shared.state()
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            forwarded: self.shared.forwarded.load(Ordering::Relaxed),
            malformed: self.shared.malformed.load(Ordering::Relaxed),
        }
    }

    /// Wait for the adapter's outcome. Resolves once; later calls return `ResultConsumed`.
    ///
    /// Cancel-safe, so it can sit in a `select!` next to a shutdown signal.
    pub async fn result(&mut self) -> Result<SourceExit> {
        let outcome = match self.outcome.as_mut() {
            Some(rx) => rx.await,
            None => return Err(SourceError::ResultConsumed),
        };
        self.outcome = None;
        outcome.unwrap_or(Err(SourceError::WorkerLost))
    }

    /// Request a stop and wait up to the join timeout for the thread to exit
    pub async fn stop(&mut self) -> Result<()> {
        self.shared.stop.store(true, Ordering::Release);
        let _ = self.shared.state.compare_exchange(
            AdapterState::Streaming as u8,
            AdapterState::Stopping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        let Some(handle) = self.thread.take() else {
            return Ok(());
        };

        let join = tokio::task::spawn_blocking(move || handle.join());
        match tokio::time::timeout(self.join_timeout, join).await {
            Ok(Ok(Ok(()))) => {
                info!("{} source stopped", self.name);
                Ok(())
            }
            Ok(Ok(Err(_))) => {
                error!("{} worker thread panicked", self.name);
                Err(SourceError::WorkerLost)
            }
            Ok(Err(e)) => {
                error!("Failed to join {} worker thread: {}", self.name, e);
                Err(SourceError::WorkerLost)
            }
            Err(_) => {
                warn!(
                    "{} worker thread did not finish within {:?}",
                    self.name, self.join_timeout
                );
                Err(SourceError::JoinTimeout(self.join_timeout))
            }
        }
    }
}

impl Drop for SourceWorker {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
    }
}

fn run<A: SourceAdapter>(
    mut adapter: A,
    broadcaster: RelayBroadcaster,
    config: WorkerConfig,
    shared: Arc<Shared>,
    connected: oneshot::Sender<Result<()>>,
    outcome: oneshot::Sender<Result<SourceExit>>,
) {
    let name = adapter.name();

    shared.set_state(AdapterState::Connecting);
    info!("Connecting {} source", name);

    if let Err(e) = adapter.connect() {
        error!("{} source failed to connect: {}", name, e);
        adapter.shutdown();
        shared.set_state(AdapterState::Stopped);
        let _ = connected.send(Err(e));
        return;
    }

    shared.set_state(AdapterState::Streaming);
    if connected.send(Ok(())).is_err() {
        debug!("{} source starter went away before streaming", name);
        adapter.shutdown();
        shared.set_state(AdapterState::Stopped);
        return;
    }
    info!("{} source streaming", name);

    let result = stream(&mut adapter, &broadcaster, &config, &shared);

    shared.set_state(AdapterState::Stopping);
    adapter.shutdown();
    shared.set_state(AdapterState::Stopped);

    match &result {
        Ok(exit) => info!("{} source exited: {:?}", name, exit),
        Err(e) => error!("{} source failed: {}", name, e),
    }
    let _ = outcome.send(result);
}

fn stream<A: SourceAdapter>(
    adapter: &mut A,
    broadcaster: &RelayBroadcaster,
    config: &WorkerConfig,
    shared: &Shared,
) -> Result<SourceExit> {
    let name = adapter.name();
    let mut diagnostics = Diagnostics::new(config.diagnostics_interval);

    loop {
        if shared.stop_requested() {
            return Ok(SourceExit::Cancelled);
        }

        match adapter.poll_once(config.poll_timeout)? {
            Polled::Idle => {}
            Polled::Exhausted => return Ok(SourceExit::Finished),
            Polled::Ready(messages) => {
                for raw in messages {
                    let readings = match adapter.decode(raw) {
                        Ok(readings) => readings,
                        Err(e) => {
                            debug!("Dropping {} message: {}", name, e);
                            shared.malformed.fetch_add(1, Ordering::Relaxed);
                            diagnostics.malformed += 1;
                            continue;
                        }
                    };

                    for reading in readings {
                        for event in adapter.normalize(reading) {
                            let is_sample = matches!(event, TelemetryEvent::Sample { .. });
                            if !broadcaster.publish(event) {
                                info!("Relay closed, stopping {} source", name);
                                return Ok(SourceExit::Cancelled);
                            }
                            if is_sample {
                                shared.forwarded.fetch_add(1, Ordering::Relaxed);
                                diagnostics.forwarded += 1;
                            }
                        }
                    }
                }
            }
        }

        diagnostics.maybe_log(name);
    }
}
