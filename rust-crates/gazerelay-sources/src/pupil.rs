//! Pupil Core source over ZeroMQ
//!
//! Asks Pupil Remote for its SUB port, then subscribes to the gaze/surface
//! topic and, when blinks come from markers, to the `blinks` topic. The
//! worker thread drives the async sockets through a private current-thread
//! runtime so every wait stays bounded by the poll timeout.

use gazerelay_blink::normalize::{clamp_unit, flip_origin};
use gazerelay_blink::{BlinkHysteresisDetector, HysteresisConfig};
use gazerelay_broadcaster::events::now_ts;
use gazerelay_broadcaster::{BlinkEmbedded, GazeSample, TelemetryEvent};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::runtime::Runtime;
use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use crate::adapter::{sample_with_transition, Polled, SourceAdapter, TransitionTracker};
use crate::error::{Result, SourceError};

pub const DEFAULT_REMOTE_PORT: u16 = 50020;
pub const DEFAULT_TOPIC: &str = "surfaces.";
/// Topic prefix of Surface Tracker datums
pub const SURFACE_TOPIC: &str = "surfaces";
pub const BLINK_TOPIC: &str = "blinks";
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Signal that drives the blink detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BlinkSignal {
    /// Smoothed per-sample confidence
    #[default]
    Confidence,
    /// Onset/offset markers from the blink detector plugin
    Markers,
}

#[derive(Debug, Clone)]
pub struct PupilConfig {
    pub host: String,
    pub remote_port: u16,
    /// Topic prefix for position data
    pub topic: String,
    /// Surface to follow when subscribed to surface data; empty accepts any
    pub surface_name: String,
    /// Minimum confidence for a sample to be marked valid
    pub confidence_threshold: f64,
    pub blink_signal: BlinkSignal,
    pub close_confidence: f64,
    pub open_confidence: f64,
    pub confidence_ema_alpha: f64,
    pub hold_ms: f64,
    pub handshake_timeout: Duration,
}

impl Default for PupilConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            remote_port: DEFAULT_REMOTE_PORT,
            topic: DEFAULT_TOPIC.to_string(),
            surface_name: "screen".to_string(),
            confidence_threshold: 0.6,
            blink_signal: BlinkSignal::Confidence,
            close_confidence: 0.35,
            open_confidence: 0.55,
            confidence_ema_alpha: 0.4,
            hold_ms: 120.0,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl PupilConfig {
    fn remote_endpoint(&self) -> String {
        format!("tcp://{}:{}", self.host, self.remote_port)
    }
}

/// Subscription a frame arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Position,
    BlinkMarkers,
}

/// Multipart ZeroMQ message as received
#[derive(Debug, Clone, PartialEq)]
pub struct PupilFrame {
    pub channel: Channel,
    pub parts: Vec<Vec<u8>>,
}

impl PupilFrame {
    fn from_message(channel: Channel, message: ZmqMessage) -> Self {
        Self {
            channel,
            parts: message.into_vec().into_iter().map(|part| part.to_vec()).collect(),
        }
    }
}

/// Decoded Pupil datum
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PupilReading {
    Gaze {
        ts: f64,
        /// Pupil normalized position, bottom-left origin
        norm_x: f64,
        norm_y: f64,
        confidence: f64,
    },
    /// 0.0 at blink onset, 1.0 at offset
    Marker { ts: f64, level: f64 },
}

#[derive(Debug, Deserialize)]
struct GazeDatum {
    #[serde(default)]
    norm_pos: Option<Vec<f64>>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(default)]
    timestamp_epoch: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SurfaceDatum {
    name: String,
    gaze_on_surfaces: Vec<GazeDatum>,
}

#[derive(Debug, Deserialize)]
struct BlinkDatum {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    timestamp: Option<f64>,
}

impl GazeDatum {
    fn into_reading(self) -> Result<PupilReading> {
        if self.norm_pos.is_none() && self.confidence.is_none() {
            return Err(SourceError::malformed("gaze datum has neither norm_pos nor confidence"));
        }
        let (norm_x, norm_y) = match self.norm_pos.as_deref() {
            None => (0.5, 0.5),
            Some([x, y, ..]) => (*x, *y),
            Some(other) => {
                return Err(SourceError::malformed(format!(
                    "norm_pos has {} component(s)",
                    other.len()
                )))
            }
        };
        Ok(PupilReading::Gaze {
            ts: self.timestamp.or(self.timestamp_epoch).unwrap_or_else(now_ts),
            norm_x,
            norm_y,
            confidence: self.confidence.unwrap_or(0.0),
        })
    }
}

struct Sockets {
    // Kept open for the session; Pupil Remote expects the REQ peer to stay around
    _remote: ReqSocket,
    position: SubSocket,
    blinks: Option<SubSocket>,
}

pub struct PupilSource {
    config: PupilConfig,
    runtime: Option<Runtime>,
    sockets: Option<Sockets>,
    detector: BlinkHysteresisDetector,
    tracker: TransitionTracker,
}

impl PupilSource {
    pub fn new(config: PupilConfig) -> Result<Self> {
        let detector = BlinkHysteresisDetector::new(Self::detector_config(&config))?;
        Ok(Self {
            config,
            runtime: None,
            sockets: None,
            detector,
            tracker: TransitionTracker::new(),
        })
    }

    fn detector_config(config: &PupilConfig) -> HysteresisConfig {
        match config.blink_signal {
            BlinkSignal::Confidence => {
                HysteresisConfig::new(config.close_confidence, config.open_confidence)
                    .hold_ms(config.hold_ms)
                    .ema_alpha(config.confidence_ema_alpha)
                    .initial_value(config.open_confidence)
            }
            // Markers are already binary; no smoothing
            BlinkSignal::Markers => HysteresisConfig::new(0.25, 0.75)
                .hold_ms(config.hold_ms)
                .ema_alpha(0.0)
                .initial_value(1.0),
        }
    }

    async fn handshake(config: &PupilConfig) -> Result<Sockets> {
        let endpoint = config.remote_endpoint();
        tracing::info!("Connecting to Pupil Remote at {}", endpoint);

        let mut remote = ReqSocket::new();
        remote
            .connect(&endpoint)
            .await
            .map_err(|e| SourceError::connection(format!("Pupil Remote connect error: {}", e)))?;
        remote
            .send(ZmqMessage::from("SUB_PORT"))
            .await
            .map_err(|e| SourceError::connection(format!("SUB_PORT request failed: {}", e)))?;
        let reply = remote
            .recv()
            .await
            .map_err(|e| SourceError::connection(format!("SUB_PORT reply failed: {}", e)))?;

        let sub_port = reply
            .get(0)
            .and_then(|part| std::str::from_utf8(part).ok())
            .and_then(|text| text.trim().parse::<u16>().ok())
            .ok_or_else(|| SourceError::connection("Pupil Remote sent an invalid SUB_PORT reply"))?;
        tracing::info!("Received Pupil SUB_PORT={}", sub_port);

        let sub_endpoint = format!("tcp://{}:{}", config.host, sub_port);
        let position = Self::subscribe(&sub_endpoint, &config.topic).await?;
        let blinks = match config.blink_signal {
            BlinkSignal::Markers => Some(Self::subscribe(&sub_endpoint, BLINK_TOPIC).await?),
            BlinkSignal::Confidence => None,
        };

        Ok(Sockets {
            _remote: remote,
            position,
            blinks,
        })
    }

    async fn subscribe(endpoint: &str, topic: &str) -> Result<SubSocket> {
        let mut socket = SubSocket::new();
        socket
            .connect(endpoint)
            .await
            .map_err(|e| SourceError::connection(format!("SUB connect error: {}", e)))?;
        socket
            .subscribe(topic)
            .await
            .map_err(|e| SourceError::connection(format!("Subscribe error: {}", e)))?;
        tracing::info!("Subscribed to topic prefix '{}' on {}", topic, endpoint);
        Ok(socket)
    }

    fn decode_position(&self, topic: &str, payload: &[u8]) -> Result<Vec<PupilReading>> {
        if !topic.starts_with(SURFACE_TOPIC) {
            let gaze: GazeDatum = rmp_serde::from_slice(payload)
                .map_err(|e| SourceError::malformed(format!("gaze payload: {}", e)))?;
            return Ok(vec![gaze.into_reading()?]);
        }

        let surface: SurfaceDatum = rmp_serde::from_slice(payload)
            .map_err(|e| SourceError::malformed(format!("surface payload: {}", e)))?;
        if !self.config.surface_name.is_empty() && surface.name != self.config.surface_name {
            return Ok(Vec::new());
        }
        surface
            .gaze_on_surfaces
            .into_iter()
            .map(GazeDatum::into_reading)
            .collect()
    }

    fn decode_marker(payload: &[u8]) -> Result<Vec<PupilReading>> {
        let datum: BlinkDatum = rmp_serde::from_slice(payload)
            .map_err(|e| SourceError::malformed(format!("blink payload: {}", e)))?;
        let level = match datum.kind.as_str() {
            "onset" => 0.0,
            "offset" => 1.0,
            other => return Err(SourceError::malformed(format!("unknown blink type '{}'", other))),
        };
        Ok(vec![PupilReading::Marker {
            ts: datum.timestamp.unwrap_or_else(now_ts),
            level,
        }])
    }
}

impl SourceAdapter for PupilSource {
    type Raw = PupilFrame;
    type Reading = PupilReading;

    fn name(&self) -> &'static str {
        "pupil"
    }

    fn connect(&mut self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let timeout = self.config.handshake_timeout;
        let sockets = runtime
            .block_on(async { tokio::time::timeout(timeout, Self::handshake(&self.config)).await })
            .map_err(|_| {
                SourceError::connection(format!(
                    "Unable to reach Pupil Remote at {} within {:?}. Ensure Pupil Capture is running with Remote enabled",
                    self.config.remote_endpoint(),
                    timeout
                ))
            })??;

        self.sockets = Some(sockets);
        self.runtime = Some(runtime);
        Ok(())
    }

    fn poll_once(&mut self, timeout: Duration) -> Result<Polled<PupilFrame>> {
        let (Some(runtime), Some(sockets)) = (self.runtime.as_ref(), self.sockets.as_mut()) else {
            return Err(SourceError::connection("Pupil source is not connected"));
        };

        let received = runtime.block_on(async {
            tokio::time::timeout(timeout, async {
                match sockets.blinks.as_mut() {
                    Some(blinks) => tokio::select! {
                        biased;
                        msg = sockets.position.recv() => (Channel::Position, msg),
                        msg = blinks.recv() => (Channel::BlinkMarkers, msg),
                    },
                    None => (Channel::Position, sockets.position.recv().await),
                }
            })
            .await
        });

        match received {
            Err(_) => Ok(Polled::Idle),
            Ok((channel, Ok(message))) => Ok(Polled::Ready(vec![PupilFrame::from_message(channel, message)])),
            Ok((_, Err(e))) => Err(SourceError::transport(format!("ZMQ receive error: {}", e))),
        }
    }

    fn decode(&mut self, frame: PupilFrame) -> Result<Vec<PupilReading>> {
        let [topic, payload, ..] = frame.parts.as_slice() else {
            return Err(SourceError::malformed(format!(
                "expected topic and payload, got {} frame(s)",
                frame.parts.len()
            )));
        };
        let topic = String::from_utf8_lossy(topic);

        match frame.channel {
            Channel::Position => {
                if !topic.starts_with(self.config.topic.as_str()) {
                    return Ok(Vec::new());
                }
                self.decode_position(&topic, payload)
            }
            Channel::BlinkMarkers => Self::decode_marker(payload),
        }
    }

    fn normalize(&mut self, reading: PupilReading) -> Vec<TelemetryEvent> {
        match (reading, self.config.blink_signal) {
            (
                PupilReading::Gaze {
                    ts,
                    norm_x,
                    norm_y,
                    confidence,
                },
                BlinkSignal::Confidence,
            ) => {
                let inference = self.detector.update(confidence);
                let (x_norm, y_norm) = flip_origin(norm_x, norm_y);
                let gaze = GazeSample {
                    x_norm,
                    y_norm,
                    valid: inference.filtered_value >= self.config.confidence_threshold,
                };
                let blink = BlinkEmbedded {
                    state: inference.state,
                    confidence: inference.confidence,
                };
                sample_with_transition(ts, gaze, Some(blink), &mut self.tracker)
            }
            (
                PupilReading::Gaze {
                    ts,
                    norm_x,
                    norm_y,
                    confidence,
                },
                BlinkSignal::Markers,
            ) => {
                let (x_norm, y_norm) = flip_origin(norm_x, norm_y);
                let gaze = GazeSample {
                    x_norm,
                    y_norm,
                    valid: clamp_unit(confidence) >= self.config.confidence_threshold,
                };
                vec![TelemetryEvent::sample(ts, gaze, None)]
            }
            (PupilReading::Marker { ts, level }, _) => {
                let inference = self.detector.update(level);
                self.tracker
                    .observe(ts, inference.state, inference.confidence)
                    .into_iter()
                    .collect()
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            // Socket drops may spawn cleanup tasks
            let guard = runtime.enter();
            self.sockets = None;
            drop(guard);
            runtime.shutdown_timeout(Duration::from_millis(100));
        }
        tracing::debug!("Pupil sockets closed");
    }
}
