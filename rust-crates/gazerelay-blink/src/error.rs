//! Error types for blink detection

use thiserror::Error;

/// Result type for blink detection operations
pub type Result<T> = std::result::Result<T, BlinkError>;

/// Blink detection error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlinkError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BlinkError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}
