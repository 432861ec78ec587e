//! NAT type classification result and status text.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// NAT type classification
///
/// Different NAT types decide whether peers can reach a host directly:
/// - Full Cone: any external host can send once a mapping exists
/// - Restricted: only IPs the host contacted can send back
/// - Restricted Port: only IP:port pairs the host contacted can send back
/// - Symmetric: each destination gets its own mapping, punching is unreliable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum NatType {
    /// No classification has run yet
    #[default]
    Unknown = 0,
    /// Classification is queued or running
    Searching = 1,
    /// No STUN server answered (UDP blocked or no usable servers)
    Blocked = 2,
    /// Full Cone NAT - any external host can send to the mapped port
    FullCone = 3,
    /// Restricted Cone NAT - only contacted IPs can send
    Restricted = 4,
    /// Port Restricted Cone NAT - only contacted IP:port can send
    RestrictedPort = 5,
    /// Symmetric NAT - different mapping per destination
    Symmetric = 6,
    /// Classification failed part way; retrying may succeed
    Error = 7,
}

impl NatType {
    /// Whether this is a finished classification result
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Unknown | Self::Searching)
    }

    /// Plain-language explanation shown to users
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Unknown => {
                "NAT type not checked yet. Run a NAT test to find out how reachable you are."
            }
            Self::Searching => "Testing your NAT type, this can take a few seconds...",
            Self::Blocked => {
                "No STUN server answered. UDP may be blocked by a firewall, or the server list \
                 is empty or unreachable."
            }
            Self::FullCone => {
                "Found a full-cone NAT. Other players can reach you once you send a message \
                 through your desired port."
            }
            Self::Restricted => {
                "Found a restricted NAT. Players can reach you after you punch a hole to \
                 their IP address."
            }
            Self::RestrictedPort => {
                "Found a port-restricted NAT. Players can reach you after you punch a hole to \
                 their exact IP address and port."
            }
            Self::Symmetric => {
                "Found a symmetric NAT. Your router picks a new port for every destination, so \
                 hole punching is unlikely to work. Forward your port manually."
            }
            Self::Error => "The NAT test failed part way through. Try running it again.",
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Searching,
            2 => Self::Blocked,
            3 => Self::FullCone,
            4 => Self::Restricted,
            5 => Self::RestrictedPort,
            6 => Self::Symmetric,
            7 => Self::Error,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for NatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Searching => write!(f, "Searching"),
            Self::Blocked => write!(f, "Blocked"),
            Self::FullCone => write!(f, "Full Cone NAT"),
            Self::Restricted => write!(f, "Restricted Cone NAT"),
            Self::RestrictedPort => write!(f, "Port Restricted Cone NAT"),
            Self::Symmetric => write!(f, "Symmetric NAT"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Lock-free cell holding the latest [`NatType`]
///
/// Written by the worker thread, read from any thread.
#[derive(Debug, Default)]
pub struct AtomicNatType(AtomicU8);

impl AtomicNatType {
    /// Create a cell holding `nat_type`
    #[must_use]
    pub const fn new(nat_type: NatType) -> Self {
        Self(AtomicU8::new(nat_type as u8))
    }

    /// Current value
    #[must_use]
    pub fn load(&self) -> NatType {
        NatType::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Replace the value
    pub fn store(&self, nat_type: NatType) {
        self.0.store(nat_type as u8, Ordering::Release);
    }

    /// Move to [`NatType::Searching`] unless a search is already running
    ///
    /// Returns the previous value on success, or `None` if the cell already
    /// held `Searching`.
    pub fn try_begin_search(&self) -> Option<NatType> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != NatType::Searching as u8).then_some(NatType::Searching as u8)
            })
            .ok()
            .map(NatType::from_u8)
    }
}

/// Status line for a NAT type and the last transport error, if any
///
/// Pure formatting, no network access.
#[must_use]
pub fn status_text(nat_type: NatType, last_error: Option<&str>) -> String {
    match last_error {
        Some(error) if !matches!(nat_type, NatType::Searching) => {
            format!("{nat_type}: {} (last error: {error})", nat_type.describe())
        }
        _ => format!("{nat_type}: {}", nat_type.describe()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [NatType; 8] = [
        NatType::Unknown,
        NatType::Searching,
        NatType::Blocked,
        NatType::FullCone,
        NatType::Restricted,
        NatType::RestrictedPort,
        NatType::Symmetric,
        NatType::Error,
    ];

    #[test]
    fn test_nat_type_display() {
        assert_eq!(NatType::FullCone.to_string(), "Full Cone NAT");
        assert_eq!(NatType::Restricted.to_string(), "Restricted Cone NAT");
        assert_eq!(NatType::RestrictedPort.to_string(), "Port Restricted Cone NAT");
        assert_eq!(NatType::Symmetric.to_string(), "Symmetric NAT");
        assert_eq!(NatType::Blocked.to_string(), "Blocked");
    }

    #[test]
    fn test_default_is_unknown() {
        assert_eq!(NatType::default(), NatType::Unknown);
        assert_eq!(AtomicNatType::default().load(), NatType::Unknown);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!NatType::Unknown.is_terminal());
        assert!(!NatType::Searching.is_terminal());
        for nat_type in &ALL[2..] {
            assert!(nat_type.is_terminal(), "{nat_type:?}");
        }
    }

    #[test]
    fn test_every_type_has_description() {
        for nat_type in ALL {
            assert!(!nat_type.describe().is_empty());
        }
        assert!(NatType::FullCone.describe().contains("full-cone"));
    }

    #[test]
    fn test_atomic_roundtrip() {
        let cell = AtomicNatType::new(NatType::Unknown);
        for nat_type in ALL {
            cell.store(nat_type);
            assert_eq!(cell.load(), nat_type);
        }
    }

    #[test]
    fn test_try_begin_search() {
        let cell = AtomicNatType::new(NatType::FullCone);
        assert_eq!(cell.try_begin_search(), Some(NatType::FullCone));
        assert_eq!(cell.load(), NatType::Searching);

        assert_eq!(cell.try_begin_search(), None);
        assert_eq!(cell.load(), NatType::Searching);

        cell.store(NatType::Symmetric);
        assert_eq!(cell.try_begin_search(), Some(NatType::Symmetric));
    }

    #[test]
    fn test_status_text() {
        let text = status_text(NatType::Blocked, None);
        assert!(text.starts_with("Blocked: No STUN server answered"));

        let text = status_text(NatType::Error, Some("connection refused"));
        assert!(text.ends_with("(last error: connection refused)"));

        // stale errors are hidden while a new search runs
        let text = status_text(NatType::Searching, Some("old failure"));
        assert!(!text.contains("old failure"));
    }
}
