//! RFC 3489 NAT type classification.
//!
//! The classifier runs a bounded sequence of STUN transactions over a single
//! caller-supplied socket:
//!
//! 1. Probe each server in order until one returns a mapping `M1`.
//! 2. Ask that server to answer from another IP and port. An answer means
//!    full cone.
//! 3. Probe again for mapping `M3`. A changed mapping means symmetric.
//! 4. Ask the server to answer from another port only. An answer means
//!    port restricted, silence means restricted.
//!
//! Transport failures never escape: they end as [`NatType::Blocked`] or
//! [`NatType::Error`] with the message kept in [`Classification::last_error`].

use super::types::NatType;
use natprobe_stun::{
    AttributeType, MappedAddress, StunSocket, TransactionConfig, TransportError,
    send_stun_request,
};
use std::net::SocketAddr;
use tracing::{debug, info, warn};

/// Outcome of one classification run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Derived NAT type, always terminal
    pub nat_type: NatType,
    /// Server that answered the first probe
    pub server: Option<SocketAddr>,
    /// Mapping learned from the first probe
    pub mapped: Option<MappedAddress>,
    /// Whether the NAT kept the local port in the first mapping
    pub port_preserved: Option<bool>,
    /// Last transport error seen during the run
    pub last_error: Option<String>,
}

impl Classification {
    fn new() -> Self {
        Self {
            nat_type: NatType::Unknown,
            server: None,
            mapped: None,
            port_preserved: None,
            last_error: None,
        }
    }
}

/// Classification progress
#[derive(Debug, Clone, Copy)]
enum State {
    Probing(usize),
    GotFirstMapping {
        server: SocketAddr,
        first: MappedAddress,
    },
    CheckSymmetry {
        server: SocketAddr,
        first: MappedAddress,
    },
    Done(NatType),
}

/// NAT type classifier
///
/// Holds a pre-resolved server list and the transaction budget. Every call to
/// [`classify`](Self::classify) starts from scratch.
#[derive(Debug, Clone)]
pub struct NatClassifier {
    servers: Vec<SocketAddr>,
    transaction: TransactionConfig,
}

impl NatClassifier {
    /// Create a classifier probing `servers` in order
    #[must_use]
    pub fn new(servers: Vec<SocketAddr>, transaction: TransactionConfig) -> Self {
        Self {
            servers,
            transaction,
        }
    }

    /// Servers in probe order
    #[must_use]
    pub fn servers(&self) -> &[SocketAddr] {
        &self.servers
    }

    /// Run a full classification over `socket`
    ///
    /// Blocks for at most `servers × retries × timeout` in the all-silent
    /// case, plus three more transactions once a server has answered.
    pub fn classify<S: StunSocket + ?Sized>(&self, socket: &S) -> Classification {
        let mut report = Classification::new();
        let mut state = State::Probing(0);

        if self.servers.is_empty() {
            report.last_error = Some("no STUN servers configured".to_string());
            state = State::Done(NatType::Blocked);
        }

        loop {
            state = match state {
                State::Probing(index) => self.probe_server(socket, index, &mut report),
                State::GotFirstMapping { server, first } => {
                    self.check_full_cone(socket, server, first, &mut report)
                }
                State::CheckSymmetry { server, first } => {
                    self.check_symmetry(socket, server, first, &mut report)
                }
                State::Done(nat_type) => {
                    report.nat_type = nat_type;
                    break;
                }
            };
        }

        info!(
            nat_type = %report.nat_type,
            server = ?report.server,
            mapped = ?report.mapped.map(|m| m.addr),
            "NAT classification finished"
        );
        report
    }

    /// Step 1: find a server that reports a mapping
    fn probe_server<S: StunSocket + ?Sized>(
        &self,
        socket: &S,
        index: usize,
        report: &mut Classification,
    ) -> State {
        let Some(&server) = self.servers.get(index) else {
            warn!("No STUN server answered the first probe");
            return State::Done(NatType::Blocked);
        };

        let next = State::Probing(index + 1);
        match self.request(socket, server, AttributeType::ResponseAddress, false, false) {
            Ok(Some(first)) => {
                report.server = Some(server);
                report.mapped = Some(first);
                report.port_preserved = socket
                    .local_addr()
                    .ok()
                    .map(|local| local.port() == first.port());
                debug!(
                    %server,
                    mapped = %first,
                    port_preserved = ?report.port_preserved,
                    "first mapping learned"
                );
                State::GotFirstMapping { server, first }
            }
            Ok(None) => {
                report.last_error = Some(format!("{server} returned no mapped address"));
                debug!(%server, "response without mapped address, trying next server");
                next
            }
            Err(e) => {
                debug!(%server, error = %e, "STUN server did not answer, trying next server");
                report.last_error = Some(e.to_string());
                next
            }
        }
    }

    /// Step 2: any reply from a changed IP and port proves a full cone
    fn check_full_cone<S: StunSocket + ?Sized>(
        &self,
        socket: &S,
        server: SocketAddr,
        first: MappedAddress,
        report: &mut Classification,
    ) -> State {
        match self.request(socket, server, AttributeType::ChangeRequest, true, true) {
            Ok(_) => State::Done(NatType::FullCone),
            Err(e) if e.is_timeout() => State::CheckSymmetry { server, first },
            Err(e) => fail(report, "change IP and port probe", e),
        }
    }

    /// Steps 3 and 4: compare mappings, then test port filtering
    fn check_symmetry<S: StunSocket + ?Sized>(
        &self,
        socket: &S,
        server: SocketAddr,
        first: MappedAddress,
        report: &mut Classification,
    ) -> State {
        let third = match self.request(socket, server, AttributeType::ResponseAddress, false, false)
        {
            Ok(Some(third)) => third,
            Ok(None) => {
                report.last_error = Some(format!("{server} returned no mapped address"));
                return State::Done(NatType::Error);
            }
            Err(e) => return fail(report, "repeat probe", e),
        };

        if third.addr != first.addr {
            debug!(first = %first, third = %third, "mapping changed between probes");
            return State::Done(NatType::Symmetric);
        }

        match self.request(socket, server, AttributeType::ChangeRequest, false, true) {
            Ok(_) => State::Done(NatType::RestrictedPort),
            Err(e) if e.is_timeout() => State::Done(NatType::Restricted),
            Err(e) => fail(report, "change port probe", e),
        }
    }

    fn request<S: StunSocket + ?Sized>(
        &self,
        socket: &S,
        server: SocketAddr,
        attr_type: AttributeType,
        change_ip: bool,
        change_port: bool,
    ) -> Result<Option<MappedAddress>, TransportError> {
        send_stun_request(
            socket,
            server,
            attr_type,
            change_ip,
            change_port,
            &self.transaction,
        )
        .map(|response| response.mapped_address)
    }
}

fn fail(report: &mut Classification, step: &str, error: TransportError) -> State {
    warn!(step, error = %error, "NAT classification aborted");
    report.last_error = Some(error.to_string());
    State::Done(NatType::Error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use natprobe_stun::{ChangeRequest, encode_binding_response, parse_binding_request};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::time::Duration;

    /// Server behaviour for one transaction attempt
    enum Reply {
        Map(MappedAddress),
        NoMapping,
        Silence,
        Fail(io::ErrorKind),
    }

    struct ScriptedSocket {
        local: SocketAddr,
        replies: RefCell<VecDeque<Reply>>,
        sent: RefCell<Vec<(Vec<u8>, SocketAddr)>>,
    }

    impl ScriptedSocket {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                local: "192.168.1.10:27015".parse().unwrap(),
                replies: RefCell::new(replies.into()),
                sent: RefCell::new(Vec::new()),
            }
        }

        fn sends(&self) -> usize {
            self.sent.borrow().len()
        }

        fn dest(&self, index: usize) -> SocketAddr {
            self.sent.borrow()[index].1
        }

        fn change(&self, index: usize) -> ChangeRequest {
            parse_binding_request(&self.sent.borrow()[index].0)
                .unwrap()
                .change
        }
    }

    impl StunSocket for ScriptedSocket {
        fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
            self.sent.borrow_mut().push((buf.to_vec(), dest));
            Ok(buf.len())
        }

        fn recv_timeout(
            &self,
            buf: &mut [u8],
            _timeout: Duration,
        ) -> io::Result<Option<(usize, SocketAddr)>> {
            let reply = self
                .replies
                .borrow_mut()
                .pop_front()
                .unwrap_or(Reply::Silence);
            let (last, dest) = self.sent.borrow().last().cloned().unwrap();
            let id = parse_binding_request(&last).unwrap().header.transaction_id;

            let bytes = match reply {
                Reply::Silence => return Ok(None),
                Reply::Fail(kind) => return Err(io::Error::new(kind, "scripted failure")),
                Reply::Map(mapped) => encode_binding_response(id, Some(mapped)),
                Reply::NoMapping => encode_binding_response(id, None),
            };
            buf[..bytes.len()].copy_from_slice(&bytes);
            Ok(Some((bytes.len(), dest)))
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(self.local)
        }
    }

    fn server_a() -> SocketAddr {
        "198.51.100.1:3478".parse().unwrap()
    }

    fn server_b() -> SocketAddr {
        "198.51.100.2:3478".parse().unwrap()
    }

    fn m1() -> MappedAddress {
        MappedAddress::xor(SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 5), 27015))
    }

    fn m2() -> MappedAddress {
        MappedAddress::xor(SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 5), 61001))
    }

    fn classifier(servers: Vec<SocketAddr>) -> NatClassifier {
        NatClassifier::new(servers, TransactionConfig::new(Duration::from_millis(10), 1))
    }

    #[test]
    fn test_full_cone() {
        let socket = ScriptedSocket::new(vec![Reply::Map(m1()), Reply::Map(m1())]);
        let report = classifier(vec![server_a()]).classify(&socket);

        assert_eq!(report.nat_type, NatType::FullCone);
        assert_eq!(report.server, Some(server_a()));
        assert_eq!(report.mapped, Some(m1()));
        assert_eq!(socket.sends(), 2);
        assert_eq!(socket.change(0), ChangeRequest::NONE);
        assert_eq!(socket.change(1), ChangeRequest::IP_AND_PORT);
    }

    #[test]
    fn test_restricted_port() {
        let socket = ScriptedSocket::new(vec![
            Reply::Map(m1()),
            Reply::Silence,
            Reply::Map(m1()),
            Reply::Map(m1()),
        ]);
        let report = classifier(vec![server_a()]).classify(&socket);

        assert_eq!(report.nat_type, NatType::RestrictedPort);
        assert_eq!(socket.sends(), 4);
        assert_eq!(socket.change(2), ChangeRequest::NONE);
        assert_eq!(socket.change(3), ChangeRequest::PORT_ONLY);
        assert!((0..4).all(|i| socket.dest(i) == server_a()));
    }

    #[test]
    fn test_restricted() {
        let socket = ScriptedSocket::new(vec![
            Reply::Map(m1()),
            Reply::Silence,
            Reply::Map(m1()),
            Reply::Silence,
        ]);
        let report = classifier(vec![server_a()]).classify(&socket);

        assert_eq!(report.nat_type, NatType::Restricted);
        assert_eq!(socket.sends(), 4);
        assert_eq!(report.last_error, None);
    }

    #[test]
    fn test_symmetric() {
        let socket = ScriptedSocket::new(vec![Reply::Map(m1()), Reply::Silence, Reply::Map(m2())]);
        let report = classifier(vec![server_a()]).classify(&socket);

        assert_eq!(report.nat_type, NatType::Symmetric);
        assert_eq!(socket.sends(), 3);
    }

    #[test]
    fn test_same_mapping_in_other_encoding_is_not_symmetric() {
        let plain = MappedAddress::plain(m1().addr);
        let socket = ScriptedSocket::new(vec![
            Reply::Map(m1()),
            Reply::Silence,
            Reply::Map(plain),
            Reply::Silence,
        ]);
        let report = classifier(vec![server_a()]).classify(&socket);

        assert_eq!(report.nat_type, NatType::Restricted);
    }

    #[test]
    fn test_blocked_when_no_server_answers() {
        let socket = ScriptedSocket::new(vec![]);
        let report = classifier(vec![server_a(), server_b()]).classify(&socket);

        assert_eq!(report.nat_type, NatType::Blocked);
        assert_eq!(report.server, None);
        assert_eq!(socket.sends(), 2);
        assert_eq!(socket.dest(0), server_a());
        assert_eq!(socket.dest(1), server_b());
        assert!(report.last_error.unwrap().contains("no STUN response"));
    }

    #[test]
    fn test_falls_back_to_second_server() {
        let socket = ScriptedSocket::new(vec![Reply::Silence, Reply::Map(m1()), Reply::Map(m1())]);
        let report = classifier(vec![server_a(), server_b()]).classify(&socket);

        assert_eq!(report.nat_type, NatType::FullCone);
        assert_eq!(report.server, Some(server_b()));
        assert_eq!(socket.dest(1), server_b());
        assert_eq!(socket.dest(2), server_b());
    }

    #[test]
    fn test_io_error_in_first_probe_moves_to_next_server() {
        let socket = ScriptedSocket::new(vec![
            Reply::Fail(io::ErrorKind::ConnectionRefused),
            Reply::Map(m1()),
            Reply::Map(m1()),
        ]);
        let report = classifier(vec![server_a(), server_b()]).classify(&socket);

        assert_eq!(report.nat_type, NatType::FullCone);
        assert_eq!(report.server, Some(server_b()));
    }

    #[test]
    fn test_missing_mapping_moves_to_next_server() {
        let socket = ScriptedSocket::new(vec![Reply::NoMapping, Reply::Map(m1()), Reply::Map(m1())]);
        let report = classifier(vec![server_a(), server_b()]).classify(&socket);

        assert_eq!(report.nat_type, NatType::FullCone);
        assert_eq!(report.server, Some(server_b()));
    }

    #[test]
    fn test_empty_server_list_is_blocked_without_io() {
        let socket = ScriptedSocket::new(vec![Reply::Map(m1())]);
        let report = classifier(vec![]).classify(&socket);

        assert_eq!(report.nat_type, NatType::Blocked);
        assert_eq!(socket.sends(), 0);
        assert!(report.last_error.is_some());
    }

    #[test]
    fn test_repeat_probe_timeout_is_error() {
        let socket = ScriptedSocket::new(vec![Reply::Map(m1()), Reply::Silence, Reply::Silence]);
        let report = classifier(vec![server_a(), server_b()]).classify(&socket);

        assert_eq!(report.nat_type, NatType::Error);
        assert_eq!(socket.sends(), 3);
        assert!(report.last_error.is_some());
    }

    #[test]
    fn test_repeat_probe_without_mapping_is_error() {
        let socket = ScriptedSocket::new(vec![Reply::Map(m1()), Reply::Silence, Reply::NoMapping]);
        let report = classifier(vec![server_a()]).classify(&socket);

        assert_eq!(report.nat_type, NatType::Error);
    }

    #[test]
    fn test_io_error_after_first_mapping_is_error() {
        let socket = ScriptedSocket::new(vec![
            Reply::Map(m1()),
            Reply::Fail(io::ErrorKind::ConnectionReset),
        ]);
        let report = classifier(vec![server_a(), server_b()]).classify(&socket);

        assert_eq!(report.nat_type, NatType::Error);
        assert_eq!(socket.sends(), 2);
        assert!(report.last_error.unwrap().contains("scripted failure"));
    }

    #[test]
    fn test_io_error_in_port_probe_is_error() {
        let socket = ScriptedSocket::new(vec![
            Reply::Map(m1()),
            Reply::Silence,
            Reply::Map(m1()),
            Reply::Fail(io::ErrorKind::ConnectionReset),
        ]);
        let report = classifier(vec![server_a()]).classify(&socket);

        assert_eq!(report.nat_type, NatType::Error);
    }

    #[test]
    fn test_port_preserved_is_reported_only() {
        // Remapped port on a full cone NAT stays full cone
        let socket = ScriptedSocket::new(vec![Reply::Map(m2()), Reply::Map(m2())]);
        let report = classifier(vec![server_a()]).classify(&socket);
        assert_eq!(report.nat_type, NatType::FullCone);
        assert_eq!(report.port_preserved, Some(false));

        let socket = ScriptedSocket::new(vec![Reply::Map(m1()), Reply::Map(m1())]);
        let report = classifier(vec![server_a()]).classify(&socket);
        assert_eq!(report.port_preserved, Some(true));
    }

    #[test]
    fn test_runs_are_independent() {
        let classifier = classifier(vec![server_a()]);

        let socket = ScriptedSocket::new(vec![Reply::Map(m1()), Reply::Map(m1())]);
        assert_eq!(classifier.classify(&socket).nat_type, NatType::FullCone);

        let socket = ScriptedSocket::new(vec![]);
        let report = classifier.classify(&socket);
        assert_eq!(report.nat_type, NatType::Blocked);
        assert_eq!(report.mapped, None);
    }
}
