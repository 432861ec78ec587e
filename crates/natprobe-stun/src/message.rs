//! STUN Binding message codec (RFC 3489 / RFC 5389 subset)
//!
//! Only the messages needed for classic NAT classification are produced and
//! consumed: Binding Requests (optionally carrying CHANGE-REQUEST) and Binding
//! Success Responses carrying MAPPED-ADDRESS or XOR-MAPPED-ADDRESS.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Message Type          |        Message Length         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Magic Cookie (RFC 5389) or first 4 bytes of legacy ID     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                 Transaction ID (96 bits / rest)               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use crate::error::DecodeError;
use rand::RngCore;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use tracing::trace;

/// STUN magic cookie (0x2112A442)
pub const MAGIC_COOKIE: u32 = 0x2112_A442;

/// STUN message header size (20 bytes)
pub const HEADER_SIZE: usize = 20;

/// Binding Request message type
pub const BINDING_REQUEST: u16 = 0x0001;
/// Binding Success Response message type
pub const BINDING_RESPONSE: u16 = 0x0101;
/// Binding Error Response message type
pub const BINDING_ERROR_RESPONSE: u16 = 0x0111;

/// Class bits (C1, C0) of the message type
const CLASS_MASK: u16 = 0x0110;
/// C1=1, C0=0: success response
const CLASS_SUCCESS: u16 = 0x0100;

/// Address family byte for IPv4
const FAMILY_IPV4: u8 = 0x01;
/// Family byte, reserved byte, port, IPv4 address
const IPV4_ADDRESS_LEN: usize = 8;
/// Attribute type plus attribute length
const ATTR_HEADER_SIZE: usize = 4;

const CHANGE_IP_FLAG: u32 = 0x04;
const CHANGE_PORT_FLAG: u32 = 0x02;

/// STUN attribute types understood by this codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    /// MAPPED-ADDRESS (0x0001)
    MappedAddress,
    /// RESPONSE-ADDRESS (0x0002), deprecated
    ResponseAddress,
    /// CHANGE-REQUEST (0x0003), deprecated
    ChangeRequest,
    /// XOR-MAPPED-ADDRESS (0x0020)
    XorMappedAddress,
}

impl AttributeType {
    /// Wire code of the attribute
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::MappedAddress => 0x0001,
            Self::ResponseAddress => 0x0002,
            Self::ChangeRequest => 0x0003,
            Self::XorMappedAddress => 0x0020,
        }
    }

    /// Look up an attribute type by wire code
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0001 => Some(Self::MappedAddress),
            0x0002 => Some(Self::ResponseAddress),
            0x0003 => Some(Self::ChangeRequest),
            0x0020 => Some(Self::XorMappedAddress),
            _ => None,
        }
    }
}

/// CHANGE-REQUEST flags asking the server to answer from another address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ChangeRequest {
    /// Reply from a different IP address
    pub change_ip: bool,
    /// Reply from a different port
    pub change_port: bool,
}

impl ChangeRequest {
    /// Reply from the address the request was received on
    pub const NONE: Self = Self::new(false, false);
    /// Reply from a different IP and a different port
    pub const IP_AND_PORT: Self = Self::new(true, true);
    /// Reply from the same IP but a different port
    pub const PORT_ONLY: Self = Self::new(false, true);

    /// Create a change request
    #[must_use]
    pub const fn new(change_ip: bool, change_port: bool) -> Self {
        Self {
            change_ip,
            change_port,
        }
    }

    /// Attribute value bitmask
    #[must_use]
    pub const fn flags(self) -> u32 {
        let mut flags = 0;
        if self.change_ip {
            flags |= CHANGE_IP_FLAG;
        }
        if self.change_port {
            flags |= CHANGE_PORT_FLAG;
        }
        flags
    }

    /// Decode the attribute value bitmask
    #[must_use]
    pub const fn from_flags(flags: u32) -> Self {
        Self::new(flags & CHANGE_IP_FLAG != 0, flags & CHANGE_PORT_FLAG != 0)
    }
}

/// Transaction identifier pairing a request with its response
///
/// Requests framed with the magic cookie carry a 96-bit ID after the cookie.
/// Legacy requests use all 128 bits after the length field as the ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionId {
    /// RFC 3489 style 16-byte ID
    Legacy([u8; 16]),
    /// RFC 5389 style 12-byte ID following the magic cookie
    Cookie([u8; 12]),
}

impl TransactionId {
    /// Random legacy ID that never starts with the magic cookie
    #[must_use]
    pub fn random_legacy() -> Self {
        let mut rng = rand::thread_rng();
        let mut id = [0u8; 16];
        loop {
            rng.fill_bytes(&mut id);
            if id[..4] != MAGIC_COOKIE.to_be_bytes() {
                return Self::Legacy(id);
            }
        }
    }

    /// Random 12-byte ID for cookie framing
    #[must_use]
    pub fn random_cookie() -> Self {
        let mut id = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut id);
        Self::Cookie(id)
    }

    /// Whether the header carries the magic cookie
    #[must_use]
    pub fn has_magic_cookie(&self) -> bool {
        matches!(self, Self::Cookie(_))
    }

    /// The 16 header bytes following the length field
    #[must_use]
    pub fn to_header_bytes(&self) -> [u8; 16] {
        match self {
            Self::Legacy(id) => *id,
            Self::Cookie(id) => {
                let mut bytes = [0u8; 16];
                bytes[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
                bytes[4..].copy_from_slice(id);
                bytes
            }
        }
    }

    fn from_header_bytes(bytes: [u8; 16]) -> Self {
        if bytes[..4] == MAGIC_COOKIE.to_be_bytes() {
            let mut id = [0u8; 12];
            id.copy_from_slice(&bytes[4..]);
            Self::Cookie(id)
        } else {
            Self::Legacy(bytes)
        }
    }
}

/// Parsed 20-byte STUN header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StunHeader {
    /// Message type
    pub msg_type: u16,
    /// Byte length of the attributes following the header
    pub msg_length: u16,
    /// Transaction ID (cookie framing detected from the header bytes)
    pub transaction_id: TransactionId,
}

impl StunHeader {
    /// Parse the header of any STUN message without validating its class
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::TooShort`] if fewer than 20 bytes are present.
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(DecodeError::TooShort { len: bytes.len() });
        }

        let msg_type = u16::from_be_bytes([bytes[0], bytes[1]]);
        let msg_length = u16::from_be_bytes([bytes[2], bytes[3]]);
        let mut id = [0u8; 16];
        id.copy_from_slice(&bytes[4..HEADER_SIZE]);

        Ok(Self {
            msg_type,
            msg_length,
            transaction_id: TransactionId::from_header_bytes(id),
        })
    }

    /// Magic cookie, if the header uses cookie framing
    #[must_use]
    pub fn magic_cookie(&self) -> Option<u32> {
        self.transaction_id
            .has_magic_cookie()
            .then_some(MAGIC_COOKIE)
    }

    /// Whether the class bits mark a success response
    #[must_use]
    pub fn is_success_response(&self) -> bool {
        self.msg_type & CLASS_MASK == CLASS_SUCCESS
    }

    fn attributes<'a>(&self, bytes: &'a [u8]) -> Result<&'a [u8], DecodeError> {
        let declared = usize::from(self.msg_length);
        let available = bytes.len() - HEADER_SIZE;
        if declared > available {
            return Err(DecodeError::LengthMismatch {
                declared,
                available,
            });
        }
        Ok(&bytes[HEADER_SIZE..HEADER_SIZE + declared])
    }
}

/// An encoded Binding Request together with its transaction ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRequest {
    transaction_id: TransactionId,
    change: Option<ChangeRequest>,
    bytes: Vec<u8>,
}

impl BindingRequest {
    /// Encode a request with a caller-chosen transaction ID
    ///
    /// A CHANGE-REQUEST attribute is appended only when `attr_type` is
    /// [`AttributeType::ChangeRequest`].
    #[must_use]
    pub fn encode(
        transaction_id: TransactionId,
        attr_type: AttributeType,
        change: ChangeRequest,
    ) -> Self {
        let change = (attr_type == AttributeType::ChangeRequest).then_some(change);

        let mut bytes = Vec::with_capacity(HEADER_SIZE + ATTR_HEADER_SIZE + 4);
        bytes.extend_from_slice(&BINDING_REQUEST.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 2]);
        bytes.extend_from_slice(&transaction_id.to_header_bytes());

        if let Some(change) = change {
            bytes.extend_from_slice(&AttributeType::ChangeRequest.code().to_be_bytes());
            bytes.extend_from_slice(&4u16.to_be_bytes());
            bytes.extend_from_slice(&change.flags().to_be_bytes());
        }

        let msg_length = (bytes.len() - HEADER_SIZE) as u16;
        bytes[2..4].copy_from_slice(&msg_length.to_be_bytes());

        Self {
            transaction_id,
            change,
            bytes,
        }
    }

    /// Transaction ID the response must echo
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// CHANGE-REQUEST flags carried by this request, if any
    #[must_use]
    pub fn change(&self) -> Option<ChangeRequest> {
        self.change
    }

    /// Encoded datagram
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the request and return the encoded datagram
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Encode a Binding Request with a fresh random transaction ID
///
/// `attr_type == ResponseAddress` selects cookie framing with a 12-byte ID;
/// every other type uses a 16-byte legacy ID. `change_ip`/`change_port` are
/// only encoded for `attr_type == ChangeRequest`.
#[must_use]
pub fn encode_binding_request(
    attr_type: AttributeType,
    change_ip: bool,
    change_port: bool,
) -> BindingRequest {
    let transaction_id = if attr_type == AttributeType::ResponseAddress {
        TransactionId::random_cookie()
    } else {
        TransactionId::random_legacy()
    };
    BindingRequest::encode(
        transaction_id,
        attr_type,
        ChangeRequest::new(change_ip, change_port),
    )
}

/// Which attribute a mapped address was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    /// MAPPED-ADDRESS, sent in the clear
    Mapped,
    /// XOR-MAPPED-ADDRESS, obfuscated with the magic cookie
    XorMapped,
}

impl AddressKind {
    fn attr_type(self) -> AttributeType {
        match self {
            Self::Mapped => AttributeType::MappedAddress,
            Self::XorMapped => AttributeType::XorMappedAddress,
        }
    }
}

/// Externally observed address reported by a STUN server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MappedAddress {
    /// Attribute the address came from
    pub kind: AddressKind,
    /// Decoded address
    pub addr: SocketAddrV4,
}

impl MappedAddress {
    /// Address carried in MAPPED-ADDRESS
    #[must_use]
    pub const fn plain(addr: SocketAddrV4) -> Self {
        Self {
            kind: AddressKind::Mapped,
            addr,
        }
    }

    /// Address carried in XOR-MAPPED-ADDRESS
    #[must_use]
    pub const fn xor(addr: SocketAddrV4) -> Self {
        Self {
            kind: AddressKind::XorMapped,
            addr,
        }
    }

    /// Mapped IPv4 address
    #[must_use]
    pub fn ip(&self) -> Ipv4Addr {
        *self.addr.ip()
    }

    /// Mapped port
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    fn encode_value(&self) -> [u8; IPV4_ADDRESS_LEN] {
        let (port, ip) = match self.kind {
            AddressKind::Mapped => (self.port(), u32::from(self.ip())),
            AddressKind::XorMapped => (
                self.port() ^ (MAGIC_COOKIE >> 16) as u16,
                u32::from(self.ip()) ^ MAGIC_COOKIE,
            ),
        };

        let mut value = [0u8; IPV4_ADDRESS_LEN];
        value[1] = FAMILY_IPV4;
        value[2..4].copy_from_slice(&port.to_be_bytes());
        value[4..8].copy_from_slice(&ip.to_be_bytes());
        value
    }

    fn decode_value(kind: AddressKind, value: &[u8]) -> Option<Self> {
        if value.len() < IPV4_ADDRESS_LEN || value[1] != FAMILY_IPV4 {
            return None;
        }

        let port = u16::from_be_bytes([value[2], value[3]]);
        let ip = u32::from_be_bytes([value[4], value[5], value[6], value[7]]);
        let (port, ip) = match kind {
            AddressKind::Mapped => (port, ip),
            AddressKind::XorMapped => (port ^ (MAGIC_COOKIE >> 16) as u16, ip ^ MAGIC_COOKIE),
        };

        Some(Self {
            kind,
            addr: SocketAddrV4::new(Ipv4Addr::from(ip), port),
        })
    }
}

impl fmt::Display for MappedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

/// Decoded Binding Success Response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StunResponse {
    /// Response header
    pub header: StunHeader,
    /// First usable MAPPED-ADDRESS or XOR-MAPPED-ADDRESS, if any
    pub mapped_address: Option<MappedAddress>,
}

/// Decode a Binding Success Response
///
/// The attribute walk stops at the first IPv4 MAPPED-ADDRESS or
/// XOR-MAPPED-ADDRESS. Unknown or zero-length attributes end the walk and
/// leave `mapped_address` empty.
///
/// # Errors
///
/// - [`DecodeError::TooShort`] if the buffer is shorter than 20 bytes
/// - [`DecodeError::NotSuccessResponse`] if the class bits are not success
/// - [`DecodeError::LengthMismatch`] if the declared length overruns the buffer
pub fn decode_binding_response(bytes: &[u8]) -> Result<StunResponse, DecodeError> {
    let header = StunHeader::parse(bytes)?;
    if !header.is_success_response() {
        return Err(DecodeError::NotSuccessResponse {
            msg_type: header.msg_type,
        });
    }

    let attributes = header.attributes(bytes)?;
    Ok(StunResponse {
        header,
        mapped_address: find_mapped_address(attributes),
    })
}

fn find_mapped_address(attributes: &[u8]) -> Option<MappedAddress> {
    let mut offset = 0;

    while offset + ATTR_HEADER_SIZE <= attributes.len() {
        let code = u16::from_be_bytes([attributes[offset], attributes[offset + 1]]);
        let attr_length =
            usize::from(u16::from_be_bytes([attributes[offset + 2], attributes[offset + 3]]));
        offset += ATTR_HEADER_SIZE;

        if attr_length == 0 {
            trace!(code, "zero-length attribute ends walk");
            return None;
        }
        let value = attributes.get(offset..offset + attr_length)?;

        match AttributeType::from_code(code) {
            None => {
                trace!(code, "unknown attribute ends walk");
                return None;
            }
            Some(AttributeType::MappedAddress) => {
                if let Some(mapped) = MappedAddress::decode_value(AddressKind::Mapped, value) {
                    return Some(mapped);
                }
            }
            Some(AttributeType::XorMappedAddress) => {
                if let Some(mapped) = MappedAddress::decode_value(AddressKind::XorMapped, value) {
                    return Some(mapped);
                }
            }
            Some(AttributeType::ResponseAddress | AttributeType::ChangeRequest) => {}
        }

        offset += padded(attr_length);
    }

    None
}

/// Attribute values are padded to a 4-byte boundary
const fn padded(len: usize) -> usize {
    (len + 3) & !3
}

/// Encode a Binding Success Response
///
/// Used by loopback STUN responders and tests. `mapped` of `None` produces a
/// response without attributes.
#[must_use]
pub fn encode_binding_response(
    transaction_id: TransactionId,
    mapped: Option<MappedAddress>,
) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_SIZE + ATTR_HEADER_SIZE + IPV4_ADDRESS_LEN);
    bytes.extend_from_slice(&BINDING_RESPONSE.to_be_bytes());
    bytes.extend_from_slice(&[0u8; 2]);
    bytes.extend_from_slice(&transaction_id.to_header_bytes());

    if let Some(mapped) = mapped {
        bytes.extend_from_slice(&mapped.kind.attr_type().code().to_be_bytes());
        bytes.extend_from_slice(&(IPV4_ADDRESS_LEN as u16).to_be_bytes());
        bytes.extend_from_slice(&mapped.encode_value());
    }

    let msg_length = (bytes.len() - HEADER_SIZE) as u16;
    bytes[2..4].copy_from_slice(&msg_length.to_be_bytes());
    bytes
}

/// A Binding Request as seen by a STUN server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedRequest {
    /// Request header
    pub header: StunHeader,
    /// CHANGE-REQUEST flags (all false when the attribute is absent)
    pub change: ChangeRequest,
}

/// Parse a Binding Request
///
/// # Errors
///
/// Returns [`DecodeError::TooShort`], [`DecodeError::NotBindingRequest`] or
/// [`DecodeError::LengthMismatch`] for malformed input.
pub fn parse_binding_request(bytes: &[u8]) -> Result<ParsedRequest, DecodeError> {
    let header = StunHeader::parse(bytes)?;
    if header.msg_type != BINDING_REQUEST {
        return Err(DecodeError::NotBindingRequest {
            msg_type: header.msg_type,
        });
    }

    let attributes = header.attributes(bytes)?;
    let mut change = ChangeRequest::NONE;
    let mut offset = 0;
    while offset + ATTR_HEADER_SIZE <= attributes.len() {
        let code = u16::from_be_bytes([attributes[offset], attributes[offset + 1]]);
        let attr_length =
            usize::from(u16::from_be_bytes([attributes[offset + 2], attributes[offset + 3]]));
        offset += ATTR_HEADER_SIZE;

        let Some(value) = attributes.get(offset..offset + attr_length) else {
            break;
        };
        if code == AttributeType::ChangeRequest.code() && value.len() == 4 {
            change = ChangeRequest::from_flags(u32::from_be_bytes([
                value[0], value[1], value[2], value[3],
            ]));
        }
        offset += padded(attr_length);
    }

    Ok(ParsedRequest { header, change })
}
