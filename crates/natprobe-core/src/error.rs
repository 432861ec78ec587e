//! Error types for classification, punching and the job queue.
//!
//! None of these cross the [`NatService`](crate::NatService) boundary as
//! failures of a classification: they are folded into a
//! [`NatType`](crate::NatType) and a last-error message.

use std::path::PathBuf;
use thiserror::Error;

/// Server list errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Server list file could not be read
    #[error("cannot read STUN server list {}: {source}", path.display())]
    Unreadable {
        /// File that failed to load
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// No usable server remained after parsing and resolution
    #[error("no usable STUN servers in {origin}")]
    Empty {
        /// Where the list came from
        origin: String,
    },
}

/// Hole punching errors
#[derive(Debug, Error)]
pub enum PunchError {
    /// Target is not an IPv4 address
    #[error("invalid punch target address: {0}")]
    InvalidAddress(String),

    /// Socket bind or send failed
    #[error("punch socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Job queue errors
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// Queue no longer accepts jobs
    #[error("job queue is shutting down")]
    ShuttingDown,

    /// Job was dropped before producing a result
    #[error("job was canceled before completing")]
    Canceled,
}

/// Service facade errors
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ServiceError {
    /// A classification is already queued or running
    #[error("NAT classification already in progress")]
    AlreadySearching,

    /// Job submission failed
    #[error(transparent)]
    Queue(#[from] QueueError),
}
