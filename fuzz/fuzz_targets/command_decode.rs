#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use minetest_protocol::protocol::registry;
use minetest_protocol::Payload;

fuzz_target!(|data: &[u8]| {
    if let Ok(payload) = Payload::from_bytes(Bytes::copy_from_slice(data)) {
        let _ = registry::decode_server(payload.clone());
        let _ = registry::decode_client(payload);
    }
});
