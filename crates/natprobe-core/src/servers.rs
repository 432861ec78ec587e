//! STUN server list loading.
//!
//! The list is a UTF-8 text file with one `host:port` per line. Blank lines,
//! `#` comments, malformed entries and hostnames that do not resolve to an
//! IPv4 address are skipped. File order is probe order.

use crate::error::ConfigError;
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use tracing::{debug, info};

/// Resolved STUN server endpoints in probe order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerList {
    servers: Vec<SocketAddr>,
}

impl ServerList {
    /// Load and resolve a server list file
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Unreadable`] if the file cannot be read
    /// - [`ConfigError::Empty`] if no line yields a usable server
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let list = Self::parse(&text);
        if list.is_empty() {
            return Err(ConfigError::Empty {
                origin: path.display().to_string(),
            });
        }

        info!(
            "Loaded {} STUN servers from {}",
            list.len(),
            path.display()
        );
        Ok(list)
    }

    /// Parse and resolve server list text, skipping unusable lines
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let servers = text
            .lines()
            .enumerate()
            .filter_map(|(index, line)| resolve_line(index + 1, line))
            .collect();
        Self { servers }
    }

    /// Build a list from already resolved addresses, keeping IPv4 only
    pub fn from_addrs(addrs: impl IntoIterator<Item = SocketAddr>) -> Self {
        Self {
            servers: addrs.into_iter().filter(SocketAddr::is_ipv4).collect(),
        }
    }

    /// Number of servers
    #[must_use]
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Whether the list is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Servers in probe order
    #[must_use]
    pub fn as_slice(&self) -> &[SocketAddr] {
        &self.servers
    }

    /// Consume the list
    #[must_use]
    pub fn into_vec(self) -> Vec<SocketAddr> {
        self.servers
    }
}

fn resolve_line(line_no: usize, line: &str) -> Option<SocketAddr> {
    let entry = line.trim();
    if entry.is_empty() || entry.starts_with('#') {
        return None;
    }

    let Some((host, port)) = entry.rsplit_once(':') else {
        debug!(line_no, entry, "skipping server entry without port");
        return None;
    };
    let host = host.trim();
    let port = match port.trim().parse::<u16>() {
        Ok(port) if port != 0 && !host.is_empty() => port,
        _ => {
            debug!(line_no, entry, "skipping malformed server entry");
            return None;
        }
    };

    match (host, port).to_socket_addrs() {
        Ok(mut addrs) => {
            let resolved = addrs.find(SocketAddr::is_ipv4);
            if resolved.is_none() {
                debug!(line_no, host, "no IPv4 address for STUN server");
            }
            resolved
        }
        Err(e) => {
            debug!(line_no, host, error = %e, "cannot resolve STUN server");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_literal_addresses_in_order() {
        let list = ServerList::parse("192.0.2.1:3478\n198.51.100.2:19302\n");
        assert_eq!(
            list.as_slice(),
            &[
                "192.0.2.1:3478".parse::<SocketAddr>().unwrap(),
                "198.51.100.2:19302".parse().unwrap(),
            ]
        );
    }

    #[test]
    fn test_parse_skips_bad_lines() {
        let text = "\
# public servers
192.0.2.1:3478


no-port-here
192.0.2.2:notaport
192.0.2.3:0
:3478
192.0.2.4:99999
  203.0.113.7:3479
";
        let list = ServerList::parse(text);
        assert_eq!(
            list.into_vec(),
            vec![
                "192.0.2.1:3478".parse::<SocketAddr>().unwrap(),
                "203.0.113.7:3479".parse().unwrap(),
            ]
        );
    }

    #[test]
    fn test_parse_resolves_localhost() {
        let list = ServerList::parse("localhost:3478");
        // localhost may resolve to ::1 only on some hosts
        for addr in list.as_slice() {
            assert!(addr.is_ipv4());
            assert_eq!(addr.port(), 3478);
        }
    }

    #[test]
    fn test_parse_skips_unresolvable_host() {
        let list = ServerList::parse("stun.invalid:3478\n192.0.2.1:3478");
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_from_addrs_drops_ipv6() {
        let list = ServerList::from_addrs([
            "[2001:db8::1]:3478".parse().unwrap(),
            "192.0.2.9:3478".parse().unwrap(),
        ]);
        assert_eq!(list.len(), 1);
        assert!(list.as_slice()[0].is_ipv4());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "192.0.2.1:3478").unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file, "192.0.2.2:3478").unwrap();

        let list = ServerList::load(file.path()).unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServerList::load(&dir.path().join("missing.txt")).unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
    }

    #[test]
    fn test_load_empty_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# nothing here").unwrap();

        let err = ServerList::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Empty { .. }));
    }
}
