//! Scenario tests for blink hysteresis and normalization bounds

use std::time::{Duration, Instant};

use gazerelay_blink::normalize::{clamp_unit, flip_origin, AngularMapping};
use gazerelay_blink::{BlinkHysteresisDetector, BlinkState, HysteresisConfig};

fn relay_detector(start: Instant) -> BlinkHysteresisDetector {
    let config = HysteresisConfig::new(0.45, 0.65)
        .hold_ms(120.0)
        .ema_alpha(1.0);
    BlinkHysteresisDetector::started_at(config, start).expect("valid config")
}

fn run(detector: &mut BlinkHysteresisDetector, start: Instant, feed: &[(f64, u64)]) -> Vec<BlinkState> {
    feed.iter()
        .map(|&(value, at_ms)| {
            detector
                .update_at(value, start + Duration::from_millis(at_ms))
                .state
        })
        .collect()
}

#[test]
fn test_reopen_suppressed_within_hold() {
    let start = Instant::now();
    let mut detector = relay_detector(start);

    let states = run(&mut detector, start, &[(0.9, 0), (0.3, 50), (0.9, 60)]);
    assert_eq!(states, vec![BlinkState::Open, BlinkState::Closed, BlinkState::Closed]);
}

#[test]
fn test_reopen_after_hold() {
    let start = Instant::now();
    let mut detector = relay_detector(start);

    let states = run(&mut detector, start, &[(0.9, 0), (0.3, 50), (0.9, 250)]);
    assert_eq!(states, vec![BlinkState::Open, BlinkState::Closed, BlinkState::Open]);
}

#[test]
fn test_constant_open_signal_converges_open() {
    let start = Instant::now();
    let config = HysteresisConfig::new(0.3, 0.6)
        .hold_ms(50.0)
        .ema_alpha(0.2)
        .initial_value(0.0);
    let mut detector = BlinkHysteresisDetector::started_at(config, start).unwrap();

    let mut last = BlinkState::Closed;
    for i in 0..200u64 {
        last = detector.update_at(0.9, start + Duration::from_millis(i * 10)).state;
    }
    assert_eq!(last, BlinkState::Open);

    for i in 200..300u64 {
        let state = detector.update_at(0.9, start + Duration::from_millis(i * 10)).state;
        assert_eq!(state, BlinkState::Open, "must stay open at step {}", i);
    }
}

#[test]
fn test_flicker_inside_band_is_suppressed() {
    let start = Instant::now();
    let mut detector = relay_detector(start);

    run(&mut detector, start, &[(0.2, 0)]);
    let noisy: Vec<(f64, u64)> = (1..50u64)
        .map(|i| (if i % 2 == 0 { 0.5 } else { 0.6 }, i * 20))
        .collect();
    let states = run(&mut detector, start, &noisy);
    assert!(states.iter().all(|s| *s == BlinkState::Closed));
}

#[test]
fn test_confidence_bounds_over_sweep() {
    let start = Instant::now();
    let config = HysteresisConfig::new(0.25, 0.75)
        .hold_ms(30.0)
        .ema_alpha(0.35);
    let mut detector = BlinkHysteresisDetector::started_at(config, start).unwrap();

    for step in 0..2_000u64 {
        let phase = step as f64 * 0.037;
        let value = 0.5 + 1.5 * phase.sin() + 0.3 * (phase * 7.0).cos();
        let inference = detector.update_at(value, start + Duration::from_millis(step * 4));
        assert!(
            (0.2..=1.0).contains(&inference.confidence),
            "confidence {} out of range at step {}",
            inference.confidence,
            step
        );
    }
}

#[test]
fn test_normalizers_stay_in_unit_square() {
    let mapping = AngularMapping::default();
    let inputs = [-1e9, -3.5, -1.0, -0.01, 0.0, 0.3, 0.5, 1.0, 1.01, 42.0, 1e12];

    for &a in &inputs {
        assert!((0.0..=1.0).contains(&clamp_unit(a)));
        for &b in &inputs {
            let (x, y) = flip_origin(a, b);
            assert!((0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y));

            let (x, y) = mapping.map(a, b);
            assert!((0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y));
        }
    }
}
