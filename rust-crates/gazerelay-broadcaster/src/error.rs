use thiserror::Error;

#[derive(Error, Debug)]
pub enum BroadcasterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Socket path error: {0}")]
    SocketPath(String),

    #[error("Delivery to subscriber {id} failed: {reason}")]
    Delivery { id: u64, reason: DeliveryFailure },

    #[error("Server not started")]
    NotStarted,

    #[error("Server already running")]
    AlreadyRunning,
}

/// Why a subscriber could not take a message
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// Connection side went away
    #[error("disconnected")]
    Closed,
    /// Outbound queue is full (slow reader)
    #[error("outbound queue full")]
    Full,
}

pub type Result<T> = std::result::Result<T, BroadcasterError>;
