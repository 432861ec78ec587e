//! Fuzz target for STUN message decoding
//!
//! Datagrams arrive from arbitrary peers, so every decoder must return Ok or
//! Err without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use natprobe_stun::{StunHeader, decode_binding_response, parse_binding_request};

fuzz_target!(|data: &[u8]| {
    if let Ok(response) = decode_binding_response(data) {
        assert!(response.header.is_success_response());
    }

    let _ = StunHeader::parse(data);
    let _ = parse_binding_request(data);
});
