//! Gaze Relay daemon library
//!
//! This module re-exports the daemon's modules for integration testing.

pub mod cli;
pub mod config;
pub mod relay;
pub mod socket_utils;

pub use config::{RelayConfig, SourceMode};
pub use relay::GazeRelay;
