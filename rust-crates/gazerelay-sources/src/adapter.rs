//! Capability trait implemented by every hardware backend

use gazerelay_blink::BlinkState;
use gazerelay_broadcaster::{BlinkEmbedded, GazeSample, TelemetryEvent};
use std::time::Duration;

use crate::error::Result;

/// Outcome of one bounded poll
#[derive(Debug, PartialEq)]
pub enum Polled<T> {
    /// Messages in processing order
    Ready(Vec<T>),
    /// Nothing arrived before the timeout
    Idle,
    /// The source has no more data
    Exhausted,
}

/// One hardware backend, driven by a [`SourceWorker`](crate::SourceWorker) on its own thread.
///
/// `connect` runs once; the worker then loops `poll_once` → `decode` → `normalize`
/// until stopped, exhausted or failed, and always finishes with `shutdown`.
pub trait SourceAdapter: Send + 'static {
    /// Message as received from the transport
    type Raw;
    /// Structurally valid message
    type Reading;

    fn name(&self) -> &'static str;

    /// Handshake with the device; a failure here is fatal and never retried
    fn connect(&mut self) -> Result<()>;

    /// Wait at most `timeout` for the next message(s)
    fn poll_once(&mut self, timeout: Duration) -> Result<Polled<Self::Raw>>;

    /// Parse a raw message. Errors are treated as malformed drops.
    /// An empty vec means the message was valid but not relevant.
    fn decode(&mut self, raw: Self::Raw) -> Result<Vec<Self::Reading>>;

    /// Normalize and run the blink detector, producing events to publish
    fn normalize(&mut self, reading: Self::Reading) -> Vec<TelemetryEvent>;

    /// Release sockets or SDK resources; called on every exit path
    fn shutdown(&mut self);
}

/// Tracks the last emitted blink state so blink events go out on transitions only
#[derive(Debug, Clone, Copy)]
pub(crate) struct TransitionTracker {
    last: BlinkState,
}

impl TransitionTracker {
    pub(crate) fn new() -> Self {
        Self {
            last: BlinkState::Open,
        }
    }

    /// Returns a blink event when `state` differs from the last one seen
    pub(crate) fn observe(&mut self, ts: f64, state: BlinkState, confidence: f64) -> Option<TelemetryEvent> {
        if state == self.last {
            return None;
        }
        self.last = state;
        Some(TelemetryEvent::blink(ts, state, confidence))
    }
}

/// Sample event followed by a blink event when the state changed
pub(crate) fn sample_with_transition(
    ts: f64,
    gaze: GazeSample,
    blink: Option<BlinkEmbedded>,
    tracker: &mut TransitionTracker,
) -> Vec<TelemetryEvent> {
    let transition = blink.and_then(|b| tracker.observe(ts, b.state, b.confidence));
    let mut events = vec![TelemetryEvent::sample(ts, gaze, blink)];
    events.extend(transition);
    events
}
