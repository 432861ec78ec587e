//! # natprobe Core
//!
//! NAT classification and hole punching for peer-to-peer hosting.
//!
//! This crate provides:
//! - Classic RFC 3489 NAT type classification against a list of STUN servers
//! - Best-effort UDP hole punching
//! - A single-worker FIFO job queue so callers never block on the network
//! - Server list loading and address classification helpers
//! - [`NatService`], the facade consumed by hosting/joining code
//!
//! ## Example
//!
//! ```rust,no_run
//! use natprobe_core::{NatService, ServerSource, TraversalConfig};
//!
//! let config = TraversalConfig::new(ServerSource::File("stun_servers.txt".into()));
//! let service = NatService::new(config).unwrap();
//!
//! // Runs on the worker thread; the status reads `Searching` until it finishes
//! let handle = service.classify_nat_async(27015).unwrap();
//! println!("{}", service.status_text());
//!
//! let nat_type = handle.wait().unwrap();
//! println!("{nat_type}: {}", service.status_text());
//!
//! service.punch("203.0.113.9", 27015).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod addr;
pub mod config;
pub mod error;
pub mod nat;
pub mod servers;
pub mod service;
pub mod worker;

// Re-export commonly used types
pub use addr::{JoinTarget, classify_target, is_external_ipv4, is_private_ipv4, is_valid_domain};
pub use config::{ServerSource, TraversalConfig};
pub use error::{ConfigError, PunchError, QueueError, ServiceError};
pub use nat::{AtomicNatType, Classification, HolePuncher, NatClassifier, NatType, punch_port};
pub use servers::ServerList;
pub use service::NatService;
pub use worker::{JobHandle, JobQueue};
