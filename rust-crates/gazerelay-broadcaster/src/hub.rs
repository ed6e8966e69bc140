//! Subscriber registry with bounded history and ordered fan-out
//!
//! Delivery never waits on a subscriber: each one owns a bounded queue and a
//! subscriber whose queue is closed or full is dropped after the pass.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::client::{encode, Subscriber};
use crate::error::{BroadcasterError, DeliveryFailure, Result};
use crate::events::TelemetryEvent;

/// Default number of broadcast payloads kept in history
pub const DEFAULT_HISTORY_CAPACITY: usize = 1024;

pub type SubscriberId = u64;

/// Outcome of one fan-out pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub pruned: usize,
}

struct HubState {
    subscribers: Vec<(SubscriberId, Subscriber)>,
    next_id: SubscriberId,
    latest: Option<TelemetryEvent>,
    history: VecDeque<TelemetryEvent>,
}

impl HubState {
    /// Deliver `line` to every subscriber in registration order, then prune failures
    fn fan_out(&mut self, line: &Arc<str>) -> DeliveryReport {
        let mut dead = Vec::new();
        let mut delivered = 0;

        for (id, subscriber) in &self.subscribers {
            match subscriber.try_deliver(line) {
                Ok(()) => delivered += 1,
                Err(reason) => {
                    tracing::warn!("Failed to send to subscriber {}: {}", id, reason);
                    dead.push(*id);
                }
            }
        }

        if !dead.is_empty() {
            self.subscribers.retain(|(id, _)| !dead.contains(id));
            tracing::info!(
                "Removed {} dead subscriber(s). Remaining: {}",
                dead.len(),
                self.subscribers.len()
            );
        }

        DeliveryReport {
            delivered,
            pruned: dead.len(),
        }
    }
}

/// Thread-safe fan-out hub; clones share state
#[derive(Clone)]
pub struct StreamHub {
    state: Arc<Mutex<HubState>>,
    history_capacity: usize,
}

impl StreamHub {
    pub fn new(history_capacity: usize) -> Self {
        let history_capacity = history_capacity.max(1);
        Self {
            state: Arc::new(Mutex::new(HubState {
                subscribers: Vec::new(),
                next_id: 1,
                latest: None,
                history: VecDeque::with_capacity(history_capacity),
            })),
            history_capacity,
        }
    }

    /// Add a subscriber and send it `ready`, followed by the latest telemetry if any
    pub fn register(&self, subscriber: Subscriber) -> Result<SubscriberId> {
        let mut state = self.state.lock();

        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.push((id, subscriber));
        let clients = state.subscribers.len();

        let ready = encode(&TelemetryEvent::Ready { clients })?;
        let catch_up = state.latest.as_ref().map(encode).transpose()?;

        let greeting = match state.subscribers.last() {
            Some((_, subscriber)) => subscriber.try_deliver(&ready).and_then(|()| match &catch_up {
                Some(line) => subscriber.try_deliver(line),
                None => Ok(()),
            }),
            None => Err(DeliveryFailure::Closed),
        };

        if let Err(reason) = greeting {
            state.subscribers.retain(|(other, _)| *other != id);
            return Err(BroadcasterError::Delivery { id, reason });
        }

        tracing::info!("Subscriber {} added. Total: {}", id, clients);
        Ok(id)
    }

    /// Remove a subscriber; unknown ids are ignored
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let mut state = self.state.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|(other, _)| *other != id);
        before != state.subscribers.len()
    }

    /// Record `event` as latest, append it to history and fan it out
    pub fn broadcast(&self, event: TelemetryEvent) -> Result<DeliveryReport> {
        let line = encode(&event)?;
        let mut state = self.state.lock();

        if state.history.len() >= self.history_capacity {
            state.history.pop_front();
        }
        state.history.push_back(event.clone());
        state.latest = Some(event);

        Ok(state.fan_out(&line))
    }

    /// Send a liveness probe to every subscriber (not recorded in history)
    pub fn ping_all(&self) -> Result<DeliveryReport> {
        let line = encode(&TelemetryEvent::ping())?;
        Ok(self.state.lock().fan_out(&line))
    }

    /// Most recently broadcast event
    pub fn latest(&self) -> Option<TelemetryEvent> {
        self.state.lock().latest.clone()
    }

    /// Snapshot of retained history, oldest first
    pub fn history(&self) -> Vec<TelemetryEvent> {
        self.state.lock().history.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    pub fn client_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Current hub status as an event
    pub fn status(&self) -> TelemetryEvent {
        let state = self.state.lock();
        TelemetryEvent::Status {
            clients: state.subscribers.len(),
            latest_ts: state.latest.as_ref().and_then(TelemetryEvent::ts),
            history: state.history.len(),
        }
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
