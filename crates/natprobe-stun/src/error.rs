//! Error types for the STUN codec and transaction engine.

use thiserror::Error;

/// Errors produced while decoding a STUN message.
///
/// Decoding never panics on malformed input; every rejection maps to one of
/// these variants so the transaction engine can treat it as a lost packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Buffer shorter than the 20-byte header
    #[error("STUN message too short: {len} bytes")]
    TooShort {
        /// Length of the rejected buffer
        len: usize,
    },

    /// Message type is not a success response
    #[error("not a STUN success response: type 0x{msg_type:04X}")]
    NotSuccessResponse {
        /// Message type found in the header
        msg_type: u16,
    },

    /// Message type is not a Binding Request
    #[error("not a STUN binding request: type 0x{msg_type:04X}")]
    NotBindingRequest {
        /// Message type found in the header
        msg_type: u16,
    },

    /// Declared attribute length does not fit in the buffer
    #[error("STUN length mismatch: header declares {declared} bytes, {available} available")]
    LengthMismatch {
        /// Attribute length declared in the header
        declared: usize,
        /// Bytes actually present after the header
        available: usize,
    },
}

/// Errors produced by a STUN transaction.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket send/receive failed at the OS level (never retried)
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// No matching success response within the retry budget
    #[error("no STUN response after {attempts} attempts")]
    Timeout {
        /// Number of attempts made
        attempts: u32,
    },
}

impl TransportError {
    /// Returns true if the transaction ran out of attempts rather than failing hard.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
