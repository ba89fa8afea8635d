#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use minetest_protocol::core::split::SplitAssembler;
use minetest_protocol::SplitFragment;

// Each 7-byte record is one fragment header plus a one-byte body.
fuzz_target!(|data: &[u8]| {
    let mut assembler = SplitAssembler::with_settings(4, std::time::Duration::from_secs(30));
    for record in data.chunks_exact(7) {
        let fragment = SplitFragment {
            sequence_number: u16::from_be_bytes([record[0], record[1]]) % 8,
            chunk_count: u16::from_be_bytes([record[2], record[3]]) % 16,
            chunk_index: u16::from_be_bytes([record[4], record[5]]) % 16,
            data: Bytes::copy_from_slice(&record[6..]),
        };
        let _ = assembler.add_fragment(fragment);
        assert!(assembler.pending() <= 4);
    }
});
