//! UDP Hole Punching
//!
//! Sends outbound datagrams that open or refresh a NAT mapping so a peer's
//! inbound packets are let through. Nothing is received here: the punch only
//! exists to create state in the NAT before the peer connects.

use crate::error::PunchError;
use natprobe_stun::{StunSocket, bind_udp_socket};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Send one datagram with an empty payload to `target_ip:target_port`
///
/// Does not wait for a reply.
///
/// # Errors
///
/// - [`PunchError::InvalidAddress`] if `target_ip` is not an IPv4 address
/// - [`PunchError::Io`] if the send fails
pub fn punch_port<S: StunSocket + ?Sized>(
    socket: &S,
    target_ip: &str,
    target_port: u16,
) -> Result<(), PunchError> {
    let target = parse_target(target_ip, target_port)?;
    socket.send_to(&[], target)?;
    debug!(%target, "punched NAT mapping");
    Ok(())
}

/// Parse a user-supplied IPv4 target
pub(crate) fn parse_target(target_ip: &str, target_port: u16) -> Result<SocketAddr, PunchError> {
    let ip: Ipv4Addr = target_ip
        .trim()
        .parse()
        .map_err(|_| PunchError::InvalidAddress(target_ip.to_string()))?;
    Ok(SocketAddr::V4(SocketAddrV4::new(ip, target_port)))
}

/// Hole puncher for UDP NAT traversal
///
/// Owns a socket bound to the local port peers will connect to.
#[derive(Debug)]
pub struct HolePuncher {
    socket: UdpSocket,
    payload: Vec<u8>,
}

impl HolePuncher {
    /// Create a hole puncher bound to a local address
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound to the specified address
    pub fn bind(bind_addr: SocketAddr) -> Result<Self, PunchError> {
        let socket = bind_udp_socket(bind_addr)?;
        Ok(Self {
            socket,
            payload: Vec::new(),
        })
    }

    /// Send `payload` instead of an empty datagram
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Get local socket address
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be determined
    pub fn local_addr(&self) -> Result<SocketAddr, PunchError> {
        Ok(self.socket.local_addr()?)
    }

    /// Send exactly one datagram to `target`
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails
    pub fn punch(&self, target: SocketAddr) -> Result<(), PunchError> {
        if !target.is_ipv4() {
            return Err(PunchError::InvalidAddress(target.to_string()));
        }
        self.socket.send_to(&self.payload, target)?;
        debug!(%target, bytes = self.payload.len(), "punched NAT mapping");
        Ok(())
    }

    /// Keep a mapping alive by punching `count` times, `interval` apart
    ///
    /// Each send is best effort; failures are logged and the loop continues.
    /// Returns the number of datagrams actually sent.
    pub fn punch_repeatedly(&self, target: SocketAddr, count: u32, interval: Duration) -> u32 {
        let mut sent = 0;
        for round in 0..count {
            if round > 0 {
                thread::sleep(interval);
            }
            match self.punch(target) {
                Ok(()) => sent += 1,
                Err(e) => warn!(%target, round, error = %e, "keep-alive punch failed"),
            }
        }
        sent
    }

    /// Release the underlying socket
    #[must_use]
    pub fn into_socket(self) -> UdpSocket {
        self.socket
    }
}
