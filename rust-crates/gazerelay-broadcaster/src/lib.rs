//! Telemetry fan-out for Gaze Relay
//!
//! This crate owns the asynchronous side of the relay: the [`StreamHub`] that
//! fans telemetry out to subscribers, the [`RelayBroadcaster`] handoff that
//! source worker threads publish into, and a Unix socket [`TelemetryServer`]
//! that turns each client connection into a hub subscriber.
//!
//! # Features
//!
//! - Newline-delimited JSON protocol
//! - Non-blocking, ordered fan-out; dead or slow subscribers are pruned
//! - Bounded history with the latest event kept for late joiners
//! - Liveness pings every 30 seconds
//! - `status` / `latest` queries from clients
//!
//! # Event Types
//!
//! - `sample` - Normalized gaze position, optionally with blink state
//! - `blink` - Blink state transition
//! - `ready` - Registration acknowledgement with subscriber count
//! - `ping` - Liveness probe
//! - `status` - Reply to a `status` query
//!
//! # Example Usage
//!
//! ```no_run
//! use gazerelay_broadcaster::{RelayBroadcaster, ServerConfig, StreamHub, TelemetryServer};
//! use gazerelay_broadcaster::events::GazeSample;
//! use gazerelay_broadcaster::TelemetryEvent;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = StreamHub::new(1024);
//!     let server = TelemetryServer::new("/tmp/gazerelay.sock", hub.clone(), ServerConfig::default());
//!     server.start().await?;
//!
//!     let (broadcaster, _drain) = RelayBroadcaster::spawn(hub);
//!     std::thread::spawn(move || {
//!         let gaze = GazeSample { x_norm: 0.5, y_norm: 0.5, valid: true };
//!         broadcaster.publish(TelemetryEvent::sample(0.0, gaze, None));
//!     });
//!
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod events;
pub mod hub;
pub mod relay;
pub mod server;

// Re-exports
pub use client::Subscriber;
pub use error::{BroadcasterError, DeliveryFailure, Result};
pub use events::{BlinkEmbedded, BlinkEvent, GazeSample, TelemetryEvent};
pub use hub::{DeliveryReport, StreamHub, SubscriberId};
pub use relay::{RelayBroadcaster, RelayReceiver};
pub use server::{ServerConfig, TelemetryServer};
