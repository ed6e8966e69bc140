//! Project Aria source over an eye-gaze SDK callback
//!
//! The SDK invokes a callback on its own thread; records are pushed into a
//! channel that the worker drains with a bounded wait.

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use gazerelay_blink::normalize::AngularMapping;
use gazerelay_blink::{BlinkHysteresisDetector, HysteresisConfig};
use gazerelay_broadcaster::events::now_ts;
use gazerelay_broadcaster::{BlinkEmbedded, GazeSample, TelemetryEvent};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::adapter::{sample_with_transition, Polled, SourceAdapter, TransitionTracker};
use crate::error::{Result, SourceError};

/// One eye-gaze record from the SDK
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeGazeRecord {
    /// Device tracking time in seconds
    #[serde(default)]
    pub tracking_timestamp: Option<f64>,
    /// Radians, positive to the right
    pub yaw: f64,
    /// Radians, positive towards the top of the view
    pub pitch: f64,
    /// Vergence depth in metres; collapses towards zero while the eye is closed
    #[serde(default)]
    pub depth: Option<f64>,
}

/// Callback for eye-gaze records (runs on an SDK thread)
pub type GazeCallback = Box<dyn Fn(EyeGazeRecord) + Send + Sync>;

/// Minimal surface of an eye-gaze streaming SDK
pub trait EyeGazeSdk: Send + 'static {
    fn connect(&mut self, device_id: &str) -> Result<()>;

    /// Begin delivering records. The SDK drops the callback when the stream ends.
    fn start_streaming(&mut self, callback: GazeCallback) -> Result<()>;

    fn stop(&mut self);
}

#[derive(Debug, Clone)]
pub struct AriaConfig {
    pub device_id: Option<String>,
    pub max_angle_deg: f64,
    pub close_depth_m: f64,
    pub open_depth_m: f64,
    pub depth_ema_alpha: f64,
    pub hold_ms: f64,
}

impl Default for AriaConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            max_angle_deg: gazerelay_blink::normalize::DEFAULT_MAX_ANGLE_DEG,
            close_depth_m: 0.02,
            open_depth_m: 0.05,
            depth_ema_alpha: 0.5,
            hold_ms: 120.0,
        }
    }
}

pub struct AriaSource<S: EyeGazeSdk> {
    sdk: S,
    device_id: String,
    mapping: AngularMapping,
    detector: BlinkHysteresisDetector,
    tracker: TransitionTracker,
    records: Option<Receiver<EyeGazeRecord>>,
}

impl<S: EyeGazeSdk> AriaSource<S> {
    pub fn new(sdk: S, config: AriaConfig) -> Result<Self> {
        let device_id = config
            .device_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                SourceError::config("Missing device identifier. Pass --device-id or export ARIA_DEVICE_ID")
            })?;

        if !config.max_angle_deg.is_finite() || config.max_angle_deg <= 0.0 {
            return Err(SourceError::config(format!(
                "max_angle_deg must be a positive angle, got {}",
                config.max_angle_deg
            )));
        }

        let detector = BlinkHysteresisDetector::new(
            HysteresisConfig::new(config.close_depth_m, config.open_depth_m)
                .hold_ms(config.hold_ms)
                .ema_alpha(config.depth_ema_alpha)
                .initial_value(config.open_depth_m),
        )?;

        Ok(Self {
            sdk,
            device_id,
            mapping: AngularMapping::from_degrees(config.max_angle_deg),
            detector,
            tracker: TransitionTracker::new(),
            records: None,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

impl<S: EyeGazeSdk> SourceAdapter for AriaSource<S> {
    type Raw = EyeGazeRecord;
    type Reading = EyeGazeRecord;

    fn name(&self) -> &'static str {
        "aria"
    }

    fn connect(&mut self) -> Result<()> {
        tracing::info!("Connecting to Aria device {}", self.device_id);
        self.sdk.connect(&self.device_id)?;

        let (tx, rx) = channel::unbounded();
        self.sdk.start_streaming(Box::new(move |record| {
            let _ = tx.send(record);
        }))?;
        self.records = Some(rx);
        Ok(())
    }

    fn poll_once(&mut self, timeout: Duration) -> Result<Polled<EyeGazeRecord>> {
        let Some(records) = self.records.as_ref() else {
            return Err(SourceError::connection("Aria source is not streaming"));
        };

        match records.recv_timeout(timeout) {
            Ok(first) => {
                let mut batch = vec![first];
                batch.extend(records.try_iter());
                Ok(Polled::Ready(batch))
            }
            Err(RecvTimeoutError::Timeout) => Ok(Polled::Idle),
            Err(RecvTimeoutError::Disconnected) => {
                Err(SourceError::connection("Eye-gaze stream closed by the SDK"))
            }
        }
    }

    fn decode(&mut self, record: EyeGazeRecord) -> Result<Vec<EyeGazeRecord>> {
        if !record.yaw.is_finite() || !record.pitch.is_finite() {
            return Err(SourceError::malformed(format!(
                "non-finite gaze angles (yaw {}, pitch {})",
                record.yaw, record.pitch
            )));
        }
        Ok(vec![record])
    }

    fn normalize(&mut self, record: EyeGazeRecord) -> Vec<TelemetryEvent> {
        let ts = record.tracking_timestamp.unwrap_or_else(now_ts);
        let (x_norm, y_norm) = self.mapping.map(record.yaw, record.pitch);
        let inference = self.detector.update(record.depth.unwrap_or(0.0));

        let gaze = GazeSample {
            x_norm,
            y_norm,
            valid: true,
        };
        let blink = BlinkEmbedded {
            state: inference.state,
            confidence: inference.confidence,
        };
        sample_with_transition(ts, gaze, Some(blink), &mut self.tracker)
    }

    fn shutdown(&mut self) {
        self.sdk.stop();
        self.records = None;
        tracing::debug!("Aria SDK stopped");
    }
}

pub const DEFAULT_BRIDGE_ADDR: &str = "127.0.0.1:6768";
const BRIDGE_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// SDK binding for a companion streamer that forwards eye-gaze records as JSON lines.
///
/// On connect the bridge sends `{"device_id": ...}` and then reads one
/// [`EyeGazeRecord`] per line until the streamer closes the connection.
pub struct TcpGazeBridge {
    addr: String,
    stream: Option<TcpStream>,
    reader: Option<JoinHandle<()>>,
}

impl TcpGazeBridge {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            stream: None,
            reader: None,
        }
    }

    fn resolve(&self) -> Result<SocketAddr> {
        self.addr
            .to_socket_addrs()
            .map_err(|e| SourceError::config(format!("Invalid bridge address {}: {}", self.addr, e)))?
            .next()
            .ok_or_else(|| SourceError::config(format!("Bridge address {} did not resolve", self.addr)))
    }
}

impl EyeGazeSdk for TcpGazeBridge {
    fn connect(&mut self, device_id: &str) -> Result<()> {
        let addr = self.resolve()?;
        let mut stream = TcpStream::connect_timeout(&addr, BRIDGE_CONNECT_TIMEOUT).map_err(|e| {
            SourceError::connection(format!("Unable to reach gaze bridge at {}: {}", addr, e))
        })?;

        let hello = serde_json::json!({ "device_id": device_id });
        writeln!(stream, "{}", hello)
            .map_err(|e| SourceError::connection(format!("Bridge handshake failed: {}", e)))?;

        tracing::info!("Connected to gaze bridge at {}", addr);
        self.stream = Some(stream);
        Ok(())
    }

    fn start_streaming(&mut self, callback: GazeCallback) -> Result<()> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| SourceError::connection("Gaze bridge is not connected"))?
            .try_clone()?;

        let reader = std::thread::Builder::new()
            .name("aria-gaze-bridge".to_string())
            .spawn(move || {
                let mut reader = BufReader::new(stream);
                let mut line = String::new();
                loop {
                    line.clear();
                    match reader.read_line(&mut line) {
                        Ok(0) => break,
                        Ok(_) => {
                            let text = line.trim();
                            if text.is_empty() {
                                continue;
                            }
                            match serde_json::from_str::<EyeGazeRecord>(text) {
                                Ok(record) => callback(record),
                                Err(e) => tracing::debug!("Skipping bridge line: {}", e),
                            }
                        }
                        Err(e) => {
                            tracing::debug!("Gaze bridge read ended: {}", e);
                            break;
                        }
                    }
                }
            })?;

        self.reader = Some(reader);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            // Unblocks the reader thread
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                tracing::warn!("Gaze bridge reader thread panicked");
            }
        }
    }
}
