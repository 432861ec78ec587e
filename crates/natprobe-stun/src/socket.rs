//! Datagram socket seam for STUN transactions.
//!
//! All STUN I/O is blocking with an explicit per-receive timeout. The
//! [`StunSocket`] trait is implemented for [`std::net::UdpSocket`]; tests
//! substitute scripted sockets.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// Smallest read timeout handed to the OS (a zero timeout is rejected)
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// A datagram socket usable by the transaction engine and the hole puncher
pub trait StunSocket {
    /// Send one datagram to `dest`
    ///
    /// # Errors
    ///
    /// Returns the OS error if the datagram cannot be sent.
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize>;

    /// Wait up to `timeout` for one datagram
    ///
    /// Returns `Ok(None)` when the timeout elapses without data.
    ///
    /// # Errors
    ///
    /// Returns the OS error for any failure other than the timeout.
    fn recv_timeout(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>>;

    /// Local address the socket is bound to
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be determined.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl StunSocket for UdpSocket {
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, dest)
    }

    fn recv_timeout(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        self.set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;
        match self.recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            // Unix reports WouldBlock, Windows reports TimedOut
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

impl<T: StunSocket + ?Sized> StunSocket for &T {
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        (**self).send_to(buf, dest)
    }

    fn recv_timeout(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        (**self).recv_timeout(buf, timeout)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        (**self).local_addr()
    }
}

/// Bind a blocking UDP socket with `SO_REUSEADDR` set
///
/// Address reuse lets the classifier and puncher bind the same local port a
/// game server uses, so the NAT mapping they observe is the one peers hit.
///
/// # Errors
///
/// Returns an error if the socket cannot be created or bound.
pub fn bind_udp_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(false)?;
    socket.bind(&addr.into())?;

    Ok(socket.into())
}
