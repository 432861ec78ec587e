//! Blocking STUN transactions with timeout and retry.
//!
//! One transaction = one encoded request, sent up to `retries` times. Each
//! attempt waits up to `timeout` for a single datagram. A timeout or an
//! undecodable/unmatched datagram consumes the attempt; an OS-level socket
//! error aborts the transaction immediately.

use crate::error::TransportError;
use crate::message::{
    AttributeType, BindingRequest, StunResponse, decode_binding_response, encode_binding_request,
};
use crate::socket::StunSocket;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;

/// Default per-attempt timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default number of attempts per transaction
pub const DEFAULT_RETRIES: u32 = 3;

/// Receive buffer size; STUN responses used here are well under this
const RECV_BUFFER_SIZE: usize = 2048;

/// Timeout and retry budget of a single transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionConfig {
    /// How long each attempt waits for a response
    pub timeout: Duration,
    /// Number of attempts
    pub retries: u32,
}

impl TransactionConfig {
    /// Create a transaction budget
    #[must_use]
    pub const fn new(timeout: Duration, retries: u32) -> Self {
        Self { timeout, retries }
    }

    /// Longest time a transaction can block before reporting a timeout
    #[must_use]
    pub fn worst_case(&self) -> Duration {
        self.timeout * self.retries
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_RETRIES)
    }
}

/// Encode a Binding Request and run it as one transaction
///
/// # Errors
///
/// - [`TransportError::Io`] on any socket failure (not retried)
/// - [`TransportError::Timeout`] if no matching success response arrives
///   within `config.retries` attempts
pub fn send_stun_request<S: StunSocket + ?Sized>(
    socket: &S,
    dest: SocketAddr,
    attr_type: AttributeType,
    change_ip: bool,
    change_port: bool,
    config: &TransactionConfig,
) -> Result<StunResponse, TransportError> {
    let request = encode_binding_request(attr_type, change_ip, change_port);
    send_and_await(socket, dest, &request, config)
}

/// Send an already encoded request and await its response
///
/// The response must be a decodable success response echoing the request's
/// transaction ID; anything else counts as a lost packet.
///
/// # Errors
///
/// Same as [`send_stun_request`].
pub fn send_and_await<S: StunSocket + ?Sized>(
    socket: &S,
    dest: SocketAddr,
    request: &BindingRequest,
    config: &TransactionConfig,
) -> Result<StunResponse, TransportError> {
    let mut buf = [0u8; RECV_BUFFER_SIZE];

    for attempt in 1..=config.retries {
        socket.send_to(request.as_bytes(), dest)?;
        debug!(%dest, attempt, change = ?request.change(), "sent STUN binding request");

        let Some((len, from)) = socket.recv_timeout(&mut buf, config.timeout)? else {
            debug!(%dest, attempt, "STUN attempt timed out");
            continue;
        };

        match decode_binding_response(&buf[..len]) {
            Ok(response) if response.header.transaction_id == request.transaction_id() => {
                debug!(%dest, %from, attempt, mapped = ?response.mapped_address, "STUN response received");
                return Ok(response);
            }
            Ok(_) => {
                debug!(%from, attempt, "discarding STUN response for another transaction");
            }
            Err(e) => {
                debug!(%from, attempt, error = %e, "discarding undecodable datagram");
            }
        }
    }

    Err(TransportError::Timeout {
        attempts: config.retries,
    })
}
