//! Worker-thread → runtime handoff
//!
//! `publish` never blocks: events go into an unbounded FIFO channel that a task
//! on the runtime drains into the hub. Events from one publisher keep their order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::events::TelemetryEvent;
use crate::hub::StreamHub;

/// Cloneable publishing handle, safe to use from any thread
#[derive(Clone)]
pub struct RelayBroadcaster {
    tx: mpsc::UnboundedSender<TelemetryEvent>,
    published: Arc<AtomicU64>,
}

/// Runtime side of the handoff
pub struct RelayReceiver {
    rx: mpsc::UnboundedReceiver<TelemetryEvent>,
}

impl RelayBroadcaster {
    pub fn channel() -> (Self, RelayReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                published: Arc::new(AtomicU64::new(0)),
            },
            RelayReceiver { rx },
        )
    }

    /// Create a broadcaster whose events are forwarded into `hub`.
    ///
    /// Must be called from within a tokio runtime. The returned task finishes once
    /// every clone of the broadcaster is dropped and yields the number of events forwarded.
    pub fn spawn(hub: StreamHub) -> (Self, JoinHandle<u64>) {
        let (broadcaster, receiver) = Self::channel();
        let task = tokio::spawn(receiver.forward_to(hub));
        (broadcaster, task)
    }

    /// Schedule `event` for delivery; returns false once the runtime side is gone
    pub fn publish(&self, event: TelemetryEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => false,
        }
    }

    /// Number of events accepted by `publish`, across all clones
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl RelayReceiver {
    pub async fn recv(&mut self) -> Option<TelemetryEvent> {
        self.rx.recv().await
    }

    /// Drain into `hub` in publish order until all publishers are dropped
    pub async fn forward_to(mut self, hub: StreamHub) -> u64 {
        let mut forwarded = 0u64;
        while let Some(event) = self.rx.recv().await {
            if let Err(e) = hub.broadcast(event) {
                tracing::error!("Failed to broadcast telemetry: {}", e);
                continue;
            }
            forwarded += 1;
        }
        tracing::debug!("Relay drained after {} events", forwarded);
        forwarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazerelay_blink::BlinkState;

    #[tokio::test]
    async fn test_publish_from_threads_preserves_order() {
        let (broadcaster, mut receiver) = RelayBroadcaster::channel();

        let worker = broadcaster.clone();
        std::thread::spawn(move || {
            for i in 0..100 {
                assert!(worker.publish(TelemetryEvent::blink(i as f64, BlinkState::Open, 1.0)));
            }
        })
        .join()
        .unwrap();
        drop(broadcaster);

        let mut expected = 0.0;
        while let Some(event) = receiver.recv().await {
            assert_eq!(event.ts(), Some(expected));
            expected += 1.0;
        }
        assert_eq!(expected, 100.0);
    }

    #[tokio::test]
    async fn test_publish_after_receiver_dropped() {
        let (broadcaster, receiver) = RelayBroadcaster::channel();
        drop(receiver);

        assert!(broadcaster.is_closed());
        assert!(!broadcaster.publish(TelemetryEvent::ping()));
        assert_eq!(broadcaster.published(), 0);
    }

    #[tokio::test]
    async fn test_spawn_forwards_into_hub() {
        let hub = StreamHub::new(4);
        let (broadcaster, task) = RelayBroadcaster::spawn(hub.clone());

        for i in 0..6 {
            broadcaster.publish(TelemetryEvent::blink(i as f64, BlinkState::Closed, 0.5));
        }
        assert_eq!(broadcaster.published(), 6);
        drop(broadcaster);

        assert_eq!(task.await.unwrap(), 6);
        assert_eq!(hub.history_len(), 4);
        assert_eq!(hub.latest().and_then(|e| e.ts()), Some(5.0));
    }
}
