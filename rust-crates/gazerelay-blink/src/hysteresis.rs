//! Exponential smoothing + asymmetric hysteresis for stable blink states
//!
//! Closing is reported on the very sample that crosses `close_below`.
//! Reopening needs both `filtered >= open_above` and at least `hold_ms`
//! elapsed since the last transition.

use std::time::{Duration, Instant};

use crate::error::{BlinkError, Result};
use crate::normalize::clamp;
use crate::BlinkState;

/// Lower bound of the confidence score
const CONFIDENCE_FLOOR: f64 = 0.2;

/// Hysteresis detector configuration
#[derive(Debug, Clone, PartialEq)]
pub struct HysteresisConfig {
    /// Filtered values at or below this close the eye
    pub close_below: f64,

    /// Filtered values at or above this may reopen the eye (after the hold)
    pub open_above: f64,

    /// Minimum closed duration before a reopen is accepted, in milliseconds
    pub hold_ms: f64,

    /// Smoothing weight of the newest sample (0.0 = no smoothing)
    pub ema_alpha: f64,

    /// Starting filter value (default: `open_above`)
    pub initial_value: Option<f64>,
}

impl HysteresisConfig {
    /// Create config with the two band edges and default hold/smoothing
    pub fn new(close_below: f64, open_above: f64) -> Self {
        Self {
            close_below,
            open_above,
            hold_ms: 120.0,
            ema_alpha: 0.3,
            initial_value: None,
        }
    }

    /// Set minimum closed duration
    pub fn hold_ms(mut self, hold_ms: f64) -> Self {
        self.hold_ms = hold_ms;
        self
    }

    /// Set smoothing weight
    pub fn ema_alpha(mut self, alpha: f64) -> Self {
        self.ema_alpha = alpha;
        self
    }

    /// Set starting filter value
    pub fn initial_value(mut self, value: f64) -> Self {
        self.initial_value = Some(value);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.close_below.is_finite() || !self.open_above.is_finite() {
            return Err(BlinkError::config("Blink thresholds must be finite"));
        }

        if self.open_above <= self.close_below {
            return Err(BlinkError::config(format!(
                "open_above ({}) must be greater than close_below ({}) for blink hysteresis",
                self.open_above, self.close_below
            )));
        }

        if self.hold_ms.is_nan() {
            return Err(BlinkError::config("hold_ms must be a number"));
        }

        if self.ema_alpha.is_nan() {
            return Err(BlinkError::config("ema_alpha must be a number"));
        }

        if let Some(initial) = self.initial_value.filter(|v| !v.is_finite()) {
            return Err(BlinkError::config(format!("initial_value must be finite, got {}", initial)));
        }

        Ok(())
    }
}

/// Output of a single detector update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlinkInference {
    pub state: BlinkState,
    /// Continuous score in `[0.2, 1.0]`, for UI feedback rather than gating
    pub confidence: f64,
    pub filtered_value: f64,
}

/// Two-state blink detector over a noisy scalar signal
#[derive(Debug, Clone)]
pub struct BlinkHysteresisDetector {
    close_below: f64,
    open_above: f64,
    hold: Duration,
    ema_alpha: f64,
    filtered_value: f64,
    state: BlinkState,
    last_change: Instant,
}

impl BlinkHysteresisDetector {
    /// Create a detector that starts `open`, with the dwell clock started now
    pub fn new(config: HysteresisConfig) -> Result<Self> {
        Self::started_at(config, Instant::now())
    }

    /// Create a detector whose dwell clock starts at `start`
    pub fn started_at(config: HysteresisConfig, start: Instant) -> Result<Self> {
        config.validate()?;

        let hold_ms = config.hold_ms.max(0.0);
        let hold = Duration::try_from_secs_f64(hold_ms / 1000.0).unwrap_or(Duration::MAX);

        Ok(Self {
            close_below: config.close_below,
            open_above: config.open_above,
            hold,
            ema_alpha: config.ema_alpha.clamp(0.0, 1.0),
            filtered_value: config.initial_value.unwrap_or(config.open_above),
            state: BlinkState::Open,
            last_change: start,
        })
    }

    /// Feed one sample using the current monotonic time
    pub fn update(&mut self, sample: f64) -> BlinkInference {
        self.update_at(sample, Instant::now())
    }

    /// Feed one sample observed at `now`
    pub fn update_at(&mut self, sample: f64, now: Instant) -> BlinkInference {
        if sample.is_finite() {
            self.filtered_value = if self.ema_alpha == 0.0 {
                sample
            } else {
                self.ema_alpha * sample + (1.0 - self.ema_alpha) * self.filtered_value
            };
        }

        match self.state {
            BlinkState::Open if self.filtered_value <= self.close_below => {
                self.state = BlinkState::Closed;
                self.last_change = now;
            }
            BlinkState::Closed => {
                let elapsed = now.saturating_duration_since(self.last_change);
                if elapsed >= self.hold && self.filtered_value >= self.open_above {
                    self.state = BlinkState::Open;
                    self.last_change = now;
                }
            }
            BlinkState::Open => {}
        }

        BlinkInference {
            state: self.state,
            confidence: self.state_confidence(),
            filtered_value: self.filtered_value,
        }
    }

    pub fn state(&self) -> BlinkState {
        self.state
    }

    pub fn filtered_value(&self) -> f64 {
        self.filtered_value
    }

    pub fn last_change(&self) -> Instant {
        self.last_change
    }

    fn state_confidence(&self) -> f64 {
        let span = (self.open_above - self.close_below).max(1e-6);
        let normalized = clamp((self.filtered_value - self.close_below) / span, 0.0, 1.0);
        let scaled = match self.state {
            BlinkState::Open => normalized,
            BlinkState::Closed => 1.0 - normalized,
        };
        CONFIDENCE_FLOOR + (1.0 - CONFIDENCE_FLOOR) * scaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn direct(close_below: f64, open_above: f64, hold_ms: f64) -> HysteresisConfig {
        HysteresisConfig::new(close_below, open_above)
            .hold_ms(hold_ms)
            .ema_alpha(1.0)
    }

    #[test]
    fn test_rejects_inverted_band() {
        let err = BlinkHysteresisDetector::new(HysteresisConfig::new(0.6, 0.4)).unwrap_err();
        assert!(matches!(err, BlinkError::Config(_)));

        assert!(BlinkHysteresisDetector::new(HysteresisConfig::new(0.5, 0.5)).is_err());
        assert!(BlinkHysteresisDetector::new(HysteresisConfig::new(f64::NAN, 0.5)).is_err());
    }

    #[test]
    fn test_rejects_non_finite_initial_value() {
        for initial in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let config = HysteresisConfig::new(0.2, 0.8).ema_alpha(0.5).initial_value(initial);
            assert!(matches!(
                BlinkHysteresisDetector::new(config),
                Err(BlinkError::Config(_))
            ));
        }
    }

    #[test]
    fn test_starts_open_at_open_threshold() {
        let detector = BlinkHysteresisDetector::new(HysteresisConfig::new(0.2, 0.8)).unwrap();
        assert_eq!(detector.state(), BlinkState::Open);
        assert_relative_eq!(detector.filtered_value(), 0.8);
    }

    #[test]
    fn test_closes_on_same_sample() {
        let start = Instant::now();
        let mut detector = BlinkHysteresisDetector::started_at(direct(0.45, 0.65, 120.0), start).unwrap();

        let inference = detector.update_at(0.45, start);
        assert_eq!(inference.state, BlinkState::Closed);
        assert_eq!(detector.last_change(), start);
    }

    #[test]
    fn test_reopen_waits_for_hold() {
        let start = Instant::now();
        let mut detector = BlinkHysteresisDetector::started_at(direct(0.45, 0.65, 120.0), start).unwrap();

        detector.update_at(0.1, start + ms(10));
        assert_eq!(detector.update_at(0.9, start + ms(129)).state, BlinkState::Closed);
        assert_eq!(detector.update_at(0.9, start + ms(130)).state, BlinkState::Open);
    }

    #[test]
    fn test_reopen_needs_open_threshold() {
        let start = Instant::now();
        let mut detector = BlinkHysteresisDetector::started_at(direct(0.45, 0.65, 0.0), start).unwrap();

        detector.update_at(0.1, start);
        // Inside the band: sticky
        assert_eq!(detector.update_at(0.6, start + ms(500)).state, BlinkState::Closed);
        assert_eq!(detector.update_at(0.65, start + ms(510)).state, BlinkState::Open);
    }

    #[test]
    fn test_ema_smoothing() {
        let config = HysteresisConfig::new(0.2, 0.8).ema_alpha(0.5).initial_value(1.0);
        let mut detector = BlinkHysteresisDetector::new(config).unwrap();

        assert_relative_eq!(detector.update(0.0).filtered_value, 0.5);
        assert_relative_eq!(detector.update(0.0).filtered_value, 0.25);
        let inference = detector.update(0.0);
        assert_relative_eq!(inference.filtered_value, 0.125);
        assert_eq!(inference.state, BlinkState::Closed);
    }

    #[test]
    fn test_zero_alpha_passes_sample_through() {
        let config = HysteresisConfig::new(0.2, 0.8).ema_alpha(0.0);
        let mut detector = BlinkHysteresisDetector::new(config).unwrap();
        assert_relative_eq!(detector.update(0.37).filtered_value, 0.37);
    }

    #[test]
    fn test_alpha_clamped_into_unit_range() {
        let config = HysteresisConfig::new(0.2, 0.8).ema_alpha(4.0).initial_value(0.5);
        let mut detector = BlinkHysteresisDetector::new(config).unwrap();
        assert_relative_eq!(detector.update(0.9).filtered_value, 0.9);
    }

    #[test]
    fn test_non_finite_sample_keeps_filter() {
        let config = HysteresisConfig::new(0.2, 0.8).ema_alpha(0.5).initial_value(0.6);
        let mut detector = BlinkHysteresisDetector::new(config).unwrap();
        assert_relative_eq!(detector.update(f64::NAN).filtered_value, 0.6);
        assert_relative_eq!(detector.update(f64::INFINITY).filtered_value, 0.6);
    }

    #[test]
    fn test_confidence_mapping() {
        let start = Instant::now();
        let mut detector = BlinkHysteresisDetector::started_at(direct(0.4, 0.6, 0.0), start).unwrap();

        assert_relative_eq!(detector.update_at(0.6, start).confidence, 1.0);
        assert_relative_eq!(detector.update_at(0.5, start).confidence, 0.6, epsilon = 1e-12);

        // Deep closure: far from the open boundary
        assert_relative_eq!(detector.update_at(0.0, start).confidence, 1.0);
        assert_relative_eq!(detector.update_at(0.55, start).confidence, 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_negative_hold_treated_as_zero() {
        let start = Instant::now();
        let mut detector = BlinkHysteresisDetector::started_at(direct(0.4, 0.6, -50.0), start).unwrap();
        detector.update_at(0.0, start);
        assert_eq!(detector.update_at(1.0, start).state, BlinkState::Open);
    }
}
