//! Error types for source adapters

use gazerelay_blink::BlinkError;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SourceError>;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Worker thread did not finish within {0:?}")]
    JoinTimeout(Duration),

    #[error("Worker thread exited without reporting a result")]
    WorkerLost,

    #[error("Worker result was already consumed")]
    ResultConsumed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }
}

impl From<BlinkError> for SourceError {
    fn from(err: BlinkError) -> Self {
        match err {
            BlinkError::Config(msg) => Self::Config(msg),
        }
    }
}
