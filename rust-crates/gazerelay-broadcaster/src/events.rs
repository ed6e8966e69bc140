use chrono::Utc;
use gazerelay_blink::BlinkState;
use serde::{Deserialize, Serialize};

/// Normalized gaze position (screen space, top-left origin)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GazeSample {
    pub x_norm: f64,
    pub y_norm: f64,
    /// Whether the source's confidence metric cleared its threshold
    pub valid: bool,
}

/// Blink state carried inside a sample
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BlinkEmbedded {
    pub state: BlinkState,
    pub confidence: f64,
}

/// Blink state transition
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BlinkEvent {
    pub ts: f64,
    pub state: BlinkState,
    pub confidence: f64,
}

/// Event types sent to subscribers
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event")]
pub enum TelemetryEvent {
    /// Gaze sample, optionally with the current blink state
    #[serde(rename = "sample")]
    Sample {
        ts: f64,
        gaze: GazeSample,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        blink: Option<BlinkEmbedded>,
    },

    /// Blink state changed
    #[serde(rename = "blink")]
    Blink(BlinkEvent),

    /// Registration acknowledgement
    #[serde(rename = "ready")]
    Ready { clients: usize },

    /// Liveness probe
    #[serde(rename = "ping")]
    Ping { ts: f64 },

    /// Reply to a `status` query
    #[serde(rename = "status")]
    Status {
        clients: usize,
        latest_ts: Option<f64>,
        history: usize,
    },
}

impl TelemetryEvent {
    pub fn sample(ts: f64, gaze: GazeSample, blink: Option<BlinkEmbedded>) -> Self {
        Self::Sample { ts, gaze, blink }
    }

    pub fn blink(ts: f64, state: BlinkState, confidence: f64) -> Self {
        Self::Blink(BlinkEvent {
            ts,
            state,
            confidence,
        })
    }

    pub fn ping() -> Self {
        Self::Ping { ts: now_ts() }
    }

    /// Source timestamp, for events that carry one
    pub fn ts(&self) -> Option<f64> {
        match self {
            Self::Sample { ts, .. } | Self::Ping { ts } => Some(*ts),
            Self::Blink(blink) => Some(blink.ts),
            Self::Ready { .. } | Self::Status { .. } => None,
        }
    }

    /// Whether this event is hardware telemetry (as opposed to control traffic)
    pub fn is_telemetry(&self) -> bool {
        matches!(self, Self::Sample { .. } | Self::Blink(_))
    }

    /// Convert event to JSON string with newline
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Wall-clock time in seconds since the Unix epoch
pub fn now_ts() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_serialization() {
        let event = TelemetryEvent::sample(
            1699000000.5,
            GazeSample {
                x_norm: 0.25,
                y_norm: 0.75,
                valid: true,
            },
            Some(BlinkEmbedded {
                state: BlinkState::Open,
                confidence: 0.9,
            }),
        );
        let json = event.to_json_line().unwrap();
        assert!(json.contains("\"event\":\"sample\""));
        assert!(json.contains("\"x_norm\":0.25"));
        assert!(json.contains("\"blink\":{\"state\":\"open\""));
        assert!(json.ends_with('\n'));
    }

    #[test]
    fn test_sample_without_blink_omits_field() {
        let event = TelemetryEvent::sample(
            1.0,
            GazeSample {
                x_norm: 0.5,
                y_norm: 0.5,
                valid: false,
            },
            None,
        );
        let json = event.to_json_line().unwrap();
        assert!(!json.contains("\"blink\""));
        assert!(json.contains("\"valid\":false"));
    }

    #[test]
    fn test_blink_event_is_flat() {
        let event = TelemetryEvent::blink(12.5, BlinkState::Closed, 0.8);
        let value: serde_json::Value = serde_json::from_str(&event.to_json_line().unwrap()).unwrap();
        assert_eq!(value["event"], "blink");
        assert_eq!(value["state"], "closed");
        assert_eq!(value["ts"], 12.5);
        assert_eq!(value["confidence"], 0.8);
    }

    #[test]
    fn test_ready_and_ping() {
        let ready = TelemetryEvent::Ready { clients: 3 }.to_json_line().unwrap();
        assert_eq!(ready, "{\"event\":\"ready\",\"clients\":3}\n");

        let ping = TelemetryEvent::ping();
        assert!(!ping.is_telemetry());
        assert!(ping.ts().unwrap() > 1_600_000_000.0);
    }

    #[test]
    fn test_round_trip_from_wire() {
        let line = r#"{"event":"blink","ts":3.0,"state":"open","confidence":0.5}"#;
        let event: TelemetryEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event, TelemetryEvent::blink(3.0, BlinkState::Open, 0.5));
        assert!(event.is_telemetry());
    }
}
