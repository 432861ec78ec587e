//! NAT Traversal Module
//!
//! Classic RFC 3489 NAT classification and best-effort UDP hole punching.
//!
//! # Components
//!
//! - **NAT Type**: The classification result and its cross-thread status cell
//! - **Classifier**: Probes a list of STUN servers to derive the NAT type
//! - **Hole Puncher**: Sends outbound datagrams that open NAT mappings
//!
//! # NAT Types
//!
//! - **Full Cone**: Any external host can send packets to the mapped port
//! - **Restricted**: Only hosts that received packets can send back
//! - **Restricted Port**: Only specific host:port pairs can send back
//! - **Symmetric**: Different external mapping for each destination
//! - **Blocked**: No STUN server answered
//!
//! # Example
//!
//! ```rust,no_run
//! use natprobe_core::nat::{HolePuncher, NatClassifier};
//! use natprobe_stun::{TransactionConfig, bind_udp_socket};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let servers = vec!["198.51.100.7:3478".parse()?];
//! let socket = bind_udp_socket("0.0.0.0:27015".parse()?)?;
//!
//! let classifier = NatClassifier::new(servers, TransactionConfig::default());
//! let report = classifier.classify(&socket);
//! println!("NAT type: {}", report.nat_type);
//!
//! let puncher = HolePuncher::bind("0.0.0.0:27016".parse()?)?;
//! puncher.punch("203.0.113.10:27015".parse()?)?;
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod hole_punch;
pub mod types;

// Re-exports
pub use classifier::{Classification, NatClassifier};
pub use hole_punch::{HolePuncher, punch_port};
pub use types::{AtomicNatType, NatType, status_text};
