//! Synthetic gaze source for development without hardware

use gazerelay_blink::BlinkState;
use gazerelay_broadcaster::events::now_ts;
use gazerelay_broadcaster::{BlinkEmbedded, GazeSample, TelemetryEvent};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

use crate::adapter::{sample_with_transition, Polled, SourceAdapter, TransitionTracker};
use crate::error::{Result, SourceError};

pub const DEFAULT_HZ: f64 = 120.0;
pub const DEFAULT_BLINK_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Samples per second
    pub hz: f64,
    /// Time between synthetic one-tick blinks
    pub blink_interval: Duration,
    /// End the stream after this many samples
    pub max_samples: Option<u64>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            hz: DEFAULT_HZ,
            blink_interval: DEFAULT_BLINK_INTERVAL,
            max_samples: None,
        }
    }
}

/// One generated tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimTick {
    pub ts: f64,
    pub closed: bool,
}

/// Lissajous gaze with a periodic blink
pub struct SimulatedSource {
    config: SimulatedConfig,
    period: Duration,
    next_tick: Instant,
    next_blink: Instant,
    emitted: u64,
    tracker: TransitionTracker,
    rng: StdRng,
}

impl SimulatedSource {
    pub fn new(config: SimulatedConfig) -> Result<Self> {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Deterministic confidence values
    pub fn seeded(config: SimulatedConfig, seed: u64) -> Result<Self> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: SimulatedConfig, rng: StdRng) -> Result<Self> {
        if !config.hz.is_finite() || config.hz <= 0.0 {
            return Err(SourceError::config(format!(
                "Simulated rate must be positive, got {}",
                config.hz
            )));
        }
        if config.blink_interval.is_zero() {
            return Err(SourceError::config("Blink interval must be non-zero"));
        }
        let period = Duration::try_from_secs_f64(1.0 / config.hz)
            .ok()
            .filter(|period| !period.is_zero())
            .ok_or_else(|| SourceError::config(format!("Simulated rate {} Hz is out of range", config.hz)))?;

        let now = Instant::now();
        Ok(Self {
            period,
            next_tick: now,
            next_blink: now + config.blink_interval,
            emitted: 0,
            tracker: TransitionTracker::new(),
            rng,
            config,
        })
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

/// Gaze position at time `t` (seconds)
pub fn lissajous(t: f64) -> (f64, f64) {
    (0.5 + 0.25 * t.sin(), 0.5 + 0.25 * (t * 0.8).cos())
}

impl SourceAdapter for SimulatedSource {
    type Raw = SimTick;
    type Reading = SimTick;

    fn name(&self) -> &'static str {
        "simulated"
    }

    fn connect(&mut self) -> Result<()> {
        let now = Instant::now();
        self.next_tick = now;
        self.next_blink = now + self.config.blink_interval;
        tracing::info!(
            "Simulating gaze at {} Hz, blink every {:?}",
            self.config.hz,
            self.config.blink_interval
        );
        Ok(())
    }

    fn poll_once(&mut self, timeout: Duration) -> Result<Polled<SimTick>> {
        if self
            .config
            .max_samples
            .is_some_and(|max| self.emitted >= max)
        {
            return Ok(Polled::Exhausted);
        }

        let now = Instant::now();
        if now < self.next_tick {
            let wait = self.next_tick - now;
            std::thread::sleep(wait.min(timeout));
            if wait > timeout {
                return Ok(Polled::Idle);
            }
        }

        let now = Instant::now();
        // Catch up without bursting after a stall
        self.next_tick = (self.next_tick + self.period).max(now);

        let closed = now >= self.next_blink;
        if closed {
            self.next_blink = now + self.config.blink_interval;
        }

        self.emitted += 1;
        Ok(Polled::Ready(vec![SimTick { ts: now_ts(), closed }]))
    }

    fn decode(&mut self, raw: SimTick) -> Result<Vec<SimTick>> {
        Ok(vec![raw])
    }

    fn normalize(&mut self, tick: SimTick) -> Vec<TelemetryEvent> {
        let (x_norm, y_norm) = lissajous(tick.ts);
        let gaze = GazeSample {
            x_norm,
            y_norm,
            valid: true,
        };
        let blink = BlinkEmbedded {
            state: if tick.closed {
                BlinkState::Closed
            } else {
                BlinkState::Open
            },
            confidence: 0.8 + 0.2 * self.rng.random::<f64>(),
        };
        sample_with_transition(tick.ts, gaze, Some(blink), &mut self.tracker)
    }

    fn shutdown(&mut self) {
        tracing::debug!("Simulated source emitted {} samples", self.emitted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast(max_samples: Option<u64>) -> SimulatedConfig {
        SimulatedConfig {
            hz: 1000.0,
            blink_interval: Duration::from_millis(20),
            max_samples,
        }
    }

    #[test]
    fn test_rejects_bad_rate() {
        let config = SimulatedConfig {
            hz: 0.0,
            ..Default::default()
        };
        assert!(matches!(SimulatedSource::new(config), Err(SourceError::Config(_))));

        let config = SimulatedConfig {
            hz: f64::NAN,
            ..Default::default()
        };
        assert!(SimulatedSource::new(config).is_err());
    }

    #[test]
    fn test_rejects_rate_without_representable_period() {
        for hz in [1e-30, 1e30] {
            let config = SimulatedConfig {
                hz,
                ..Default::default()
            };
            assert!(matches!(SimulatedSource::new(config), Err(SourceError::Config(_))));
        }
    }

    #[test]
    fn test_lissajous_stays_in_band() {
        for i in 0..1000 {
            let (x, y) = lissajous(i as f64 * 0.37);
            assert!((0.25..=0.75).contains(&x));
            assert!((0.25..=0.75).contains(&y));
        }
    }

    #[test]
    fn test_max_samples_exhausts() {
        let mut source = SimulatedSource::seeded(fast(Some(3)), 7).unwrap();
        source.connect().unwrap();

        let mut ticks = 0;
        loop {
            match source.poll_once(Duration::from_millis(100)).unwrap() {
                Polled::Ready(batch) => ticks += batch.len(),
                Polled::Idle => {}
                Polled::Exhausted => break,
            }
        }
        assert_eq!(ticks, 3);
        assert_eq!(source.emitted(), 3);
    }

    #[test]
    fn test_blink_transitions_and_confidence() {
        let mut source = SimulatedSource::seeded(fast(None), 42).unwrap();
        source.connect().unwrap();

        let mut blink_events = Vec::new();
        let started = Instant::now();
        while started.elapsed() < Duration::from_millis(150) {
            if let Polled::Ready(batch) = source.poll_once(Duration::from_millis(10)).unwrap() {
                for tick in batch {
                    for event in source.normalize(tick) {
                        match event {
                            TelemetryEvent::Sample { gaze, blink, .. } => {
                                assert!(gaze.valid);
                                let blink = blink.expect("simulated samples embed blink");
                                assert!((0.8..=1.0).contains(&blink.confidence));
                            }
                            TelemetryEvent::Blink(b) => blink_events.push(b.state),
                            other => panic!("unexpected event {:?}", other),
                        }
                    }
                }
            }
        }

        assert!(blink_events.len() >= 2);
        // Transitions alternate, starting with a close
        for (i, state) in blink_events.iter().enumerate() {
            let expected = if i % 2 == 0 {
                BlinkState::Closed
            } else {
                BlinkState::Open
            };
            assert_eq!(*state, expected);
        }
    }
}
