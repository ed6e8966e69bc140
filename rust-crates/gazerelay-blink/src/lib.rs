//! Blink hysteresis detection and gaze coordinate normalization
//!
//! This crate turns a noisy scalar eye signal (gaze depth, pupil confidence or an
//! explicit onset/offset marker) into a stable two-state blink signal, and maps
//! device-native gaze coordinates into a normalized screen space.
//!
//! Nothing in here performs I/O. Every source adapter owns its own detector.
//!
//! # Example
//!
//! ```
//! use gazerelay_blink::{BlinkHysteresisDetector, BlinkState, HysteresisConfig};
//!
//! let config = HysteresisConfig::new(0.45, 0.65)
//!     .hold_ms(120.0)
//!     .ema_alpha(1.0);
//! let mut detector = BlinkHysteresisDetector::new(config)?;
//!
//! let inference = detector.update(0.3);
//! assert_eq!(inference.state, BlinkState::Closed);
//! # Ok::<(), gazerelay_blink::BlinkError>(())
//! ```

mod error;
mod hysteresis;
pub mod normalize;

use serde::{Deserialize, Serialize};

pub use error::{BlinkError, Result};
pub use hysteresis::{BlinkHysteresisDetector, BlinkInference, HysteresisConfig};

/// Two-state eye signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlinkState {
    Open,
    Closed,
}

impl BlinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for BlinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blink_state_serialization() {
        assert_eq!(serde_json::to_string(&BlinkState::Open).unwrap(), "\"open\"");
        assert_eq!(serde_json::to_string(&BlinkState::Closed).unwrap(), "\"closed\"");

        let parsed: BlinkState = serde_json::from_str("\"closed\"").unwrap();
        assert_eq!(parsed, BlinkState::Closed);
    }

    #[test]
    fn test_blink_state_display() {
        assert_eq!(BlinkState::Open.to_string(), "open");
        assert_eq!(BlinkState::Closed.to_string(), "closed");
    }
}
