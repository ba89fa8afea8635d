#![no_main]

use libfuzzer_sys::fuzz_target;
use minetest_protocol::Packet;

fuzz_target!(|data: &[u8]| {
    // Anything that decodes must encode back to a decodable packet.
    if let Ok(packet) = Packet::from_bytes(data) {
        let encoded = packet.to_bytes();
        assert!(Packet::decode(encoded).is_ok());
    }
});
