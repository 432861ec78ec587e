//! # natprobe STUN
//!
//! The wire protocol layer of natprobe.
//!
//! This crate provides:
//! - A codec for STUN Binding Requests and Binding Responses, including the
//!   deprecated RFC 3489 CHANGE-REQUEST attribute used for NAT classification
//! - MAPPED-ADDRESS and XOR-MAPPED-ADDRESS decoding
//! - A blocking transaction engine with per-attempt timeouts and retries
//! - The [`StunSocket`] seam so the engine can run over any datagram socket
//!
//! ## Example
//!
//! ```rust,no_run
//! use natprobe_stun::{AttributeType, TransactionConfig, bind_udp_socket, send_stun_request};
//!
//! let socket = bind_udp_socket("0.0.0.0:0".parse().unwrap()).unwrap();
//! let server = "192.0.2.10:3478".parse().unwrap();
//! let response = send_stun_request(
//!     &socket,
//!     server,
//!     AttributeType::ResponseAddress,
//!     false,
//!     false,
//!     &TransactionConfig::default(),
//! )
//! .unwrap();
//! println!("mapped: {:?}", response.mapped_address);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod message;
pub mod socket;
pub mod transaction;

pub use error::{DecodeError, TransportError};
pub use message::{
    AddressKind, AttributeType, BindingRequest, ChangeRequest, HEADER_SIZE, MAGIC_COOKIE,
    MappedAddress, ParsedRequest, StunHeader, StunResponse, TransactionId,
    decode_binding_response, encode_binding_request, encode_binding_response,
    parse_binding_request,
};
pub use socket::{StunSocket, bind_udp_socket};
pub use transaction::{
    DEFAULT_RETRIES, DEFAULT_TIMEOUT, TransactionConfig, send_and_await, send_stun_request,
};
