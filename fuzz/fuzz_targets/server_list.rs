//! Fuzz target for server list parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use natprobe_core::ServerList;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // Hostname lines may hit the resolver; only literal lines matter here
        if text.bytes().any(|b| b.is_ascii_alphabetic()) {
            return;
        }
        let list = ServerList::parse(text);
        assert!(list.as_slice().iter().all(|addr| addr.is_ipv4()));
    }
});
