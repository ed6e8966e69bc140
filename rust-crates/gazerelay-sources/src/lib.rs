//! Eye-tracking source adapters for Gaze Relay
//!
//! Each backend implements [`SourceAdapter`] and runs on a dedicated thread
//! owned by a [`SourceWorker`], which publishes normalized telemetry through a
//! [`RelayBroadcaster`](gazerelay_broadcaster::RelayBroadcaster).
//!
//! - [`SimulatedSource`] - Lissajous gaze with periodic blinks
//! - [`PupilSource`] - Pupil Core over ZeroMQ + MessagePack
//! - [`AriaSource`] - Project Aria eye-gaze SDK callback, with [`TcpGazeBridge`] as the shipped binding

pub mod adapter;
pub mod aria;
pub mod error;
pub mod pupil;
pub mod simulated;
pub mod worker;

pub use adapter::{Polled, SourceAdapter};
pub use aria::{AriaConfig, AriaSource, EyeGazeRecord, EyeGazeSdk, GazeCallback, TcpGazeBridge};
pub use error::{Result, SourceError};
pub use pupil::{BlinkSignal, PupilConfig, PupilSource};
pub use simulated::{SimulatedConfig, SimulatedSource};
pub use worker::{AdapterState, SourceExit, SourceStats, SourceWorker, WorkerConfig};
