//! Traversal context passed to the service.
//!
//! Everything the classifier and puncher need is carried in one
//! [`TraversalConfig`] value handed to [`NatService::new`](crate::NatService::new).

use crate::error::ConfigError;
use crate::servers::ServerList;
use natprobe_stun::TransactionConfig;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Where the STUN server list comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSource {
    /// Newline-delimited `host:port` file, re-read on every classification
    File(PathBuf),
    /// Pre-resolved addresses
    Static(Vec<SocketAddr>),
}

impl ServerSource {
    /// Load and resolve the server list
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or no usable server
    /// remains.
    pub fn load(&self) -> Result<ServerList, ConfigError> {
        match self {
            Self::File(path) => ServerList::load(path),
            Self::Static(addrs) => {
                let list = ServerList::from_addrs(addrs.iter().copied());
                if list.is_empty() {
                    return Err(ConfigError::Empty {
                        origin: "static server list".to_string(),
                    });
                }
                Ok(list)
            }
        }
    }
}

/// Classifier and puncher settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalConfig {
    /// STUN servers, probed in order
    pub servers: ServerSource,
    /// Timeout and retry budget of each STUN transaction
    pub transaction: TransactionConfig,
    /// Local IP the classification and punch sockets bind to
    pub bind_ip: IpAddr,
    /// Local port punches are sent from (the port peers connect to)
    pub local_port: u16,
    /// Datagram payload sent when punching
    pub punch_payload: Vec<u8>,
}

impl TraversalConfig {
    /// Create a config with default timeouts, binding all interfaces
    #[must_use]
    pub fn new(servers: ServerSource) -> Self {
        Self {
            servers,
            transaction: TransactionConfig::default(),
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            local_port: 0,
            punch_payload: Vec::new(),
        }
    }

    /// Set the per-attempt timeout and attempt count
    #[must_use]
    pub fn with_transaction(mut self, timeout: Duration, retries: u32) -> Self {
        self.transaction = TransactionConfig::new(timeout, retries);
        self
    }

    /// Set the local bind IP
    #[must_use]
    pub fn with_bind_ip(mut self, bind_ip: IpAddr) -> Self {
        self.bind_ip = bind_ip;
        self
    }

    /// Set the local port punches are sent from
    #[must_use]
    pub fn with_local_port(mut self, local_port: u16) -> Self {
        self.local_port = local_port;
        self
    }

    /// Set the punch payload
    #[must_use]
    pub fn with_punch_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.punch_payload = payload.into();
        self
    }

    /// Socket address for a local port on the configured bind IP
    #[must_use]
    pub fn bind_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.bind_ip, port)
    }
}
