//! Join address classification.
//!
//! Decides whether a candidate join address needs NAT traversal help at all.
//! LAN peers connect directly; public IPs and hostnames may sit behind a NAT.

use std::net::Ipv4Addr;

/// Kind of address a user asked to join
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinTarget {
    /// RFC 1918, loopback or link-local IPv4
    Private(Ipv4Addr),
    /// Globally routable IPv4
    External(Ipv4Addr),
    /// DNS name, resolved by the caller
    Domain(String),
    /// Neither an IPv4 address nor a valid domain name
    Invalid,
}

impl JoinTarget {
    /// Whether the peer may sit behind a NAT and needs punching
    #[must_use]
    pub fn needs_traversal(&self) -> bool {
        matches!(self, Self::External(_) | Self::Domain(_))
    }
}

/// Whether an address is only reachable on a local network
#[must_use]
pub fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    ip.is_private() || ip.is_loopback() || ip.is_link_local()
}

/// Whether an address is routable on the public internet
///
/// Excludes private, loopback, link-local, unspecified, broadcast, multicast,
/// documentation, shared (100.64.0.0/10) and reserved (240.0.0.0/4) ranges.
#[must_use]
pub fn is_external_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, _, _] = ip.octets();
    let shared = a == 100 && (64..128).contains(&b);
    let reserved = a >= 240;
    !(is_private_ipv4(ip)
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        || ip.is_documentation()
        || shared
        || reserved
        || a == 0)
}

/// Whether a string is a syntactically valid DNS hostname
///
/// Labels are 1-63 alphanumeric or `-` characters, not starting or ending in
/// `-`; at least two labels; the top-level label is not all digits.
#[must_use]
pub fn is_valid_domain(name: &str) -> bool {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() || name.len() > 253 {
        return false;
    }

    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let valid_label = |label: &&str| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    };

    labels.iter().all(valid_label)
        && labels
            .last()
            .is_some_and(|tld| !tld.bytes().all(|b| b.is_ascii_digit()))
}

/// Classify a user-supplied join address
///
/// A trailing `:port` is ignored.
#[must_use]
pub fn classify_target(input: &str) -> JoinTarget {
    let input = input.trim();
    let host = match input.rsplit_once(':') {
        Some((host, port)) if port.parse::<u16>().is_ok() => host,
        _ => input,
    };

    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        if is_private_ipv4(ip) {
            return JoinTarget::Private(ip);
        }
        if is_external_ipv4(ip) {
            return JoinTarget::External(ip);
        }
        return JoinTarget::Invalid;
    }

    if is_valid_domain(host) {
        JoinTarget::Domain(host.to_ascii_lowercase())
    } else {
        JoinTarget::Invalid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_ranges() {
        for ip in [
            "10.1.2.3",
            "172.16.0.1",
            "172.31.255.255",
            "192.168.1.20",
            "127.0.0.1",
            "169.254.10.1",
        ] {
            assert!(is_private_ipv4(ip.parse().unwrap()), "{ip}");
        }
        for ip in ["172.32.0.1", "8.8.8.8", "11.0.0.1"] {
            assert!(!is_private_ipv4(ip.parse().unwrap()), "{ip}");
        }
    }

    #[test]
    fn test_external_ranges() {
        for ip in ["8.8.8.8", "1.1.1.1", "100.128.0.1", "223.255.255.254"] {
            assert!(is_external_ipv4(ip.parse().unwrap()), "{ip}");
        }
        for ip in [
            "10.0.0.1",
            "0.0.0.0",
            "0.1.2.3",
            "255.255.255.255",
            "224.0.0.1",
            "192.0.2.1",
            "100.64.0.1",
            "240.0.0.1",
        ] {
            assert!(!is_external_ipv4(ip.parse().unwrap()), "{ip}");
        }
    }

    #[test]
    fn test_valid_domain() {
        assert!(is_valid_domain("example.com"));
        assert!(is_valid_domain("stun.l.google.com"));
        assert!(is_valid_domain("my-server.example.org."));
        assert!(is_valid_domain("xn--bcher-kva.example"));

        assert!(!is_valid_domain(""));
        assert!(!is_valid_domain("localhost"));
        assert!(!is_valid_domain("-bad.example.com"));
        assert!(!is_valid_domain("bad-.example.com"));
        assert!(!is_valid_domain("a..b"));
        assert!(!is_valid_domain("under_score.com"));
        assert!(!is_valid_domain("1.2.3.4"));
        assert!(!is_valid_domain(&format!("{}.com", "a".repeat(64))));
    }

    #[test]
    fn test_classify_target() {
        assert_eq!(
            classify_target("192.168.0.5:27015"),
            JoinTarget::Private(Ipv4Addr::new(192, 168, 0, 5))
        );
        assert_eq!(
            classify_target(" 8.8.4.4 "),
            JoinTarget::External(Ipv4Addr::new(8, 8, 4, 4))
        );
        assert_eq!(
            classify_target("Play.Example.com:27015"),
            JoinTarget::Domain("play.example.com".to_string())
        );
        assert_eq!(classify_target("224.0.0.1"), JoinTarget::Invalid);
        assert_eq!(classify_target("not a host"), JoinTarget::Invalid);
        assert_eq!(classify_target("999.1.1.1"), JoinTarget::Invalid);
    }

    #[test]
    fn test_needs_traversal() {
        assert!(classify_target("8.8.8.8").needs_traversal());
        assert!(classify_target("example.com").needs_traversal());
        assert!(!classify_target("10.0.0.2").needs_traversal());
        assert!(!JoinTarget::Invalid.needs_traversal());
    }

    proptest::proptest! {
        #[test]
        fn prop_private_is_never_external(octets in proptest::prelude::any::<[u8; 4]>()) {
            let ip = Ipv4Addr::from(octets);
            proptest::prop_assert!(!(is_private_ipv4(ip) && is_external_ipv4(ip)));
        }

        #[test]
        fn prop_classify_target_never_panics(input in ".{0,80}") {
            let _ = classify_target(&input);
        }
    }
}
