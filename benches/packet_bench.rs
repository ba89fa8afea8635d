use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use minetest_protocol::core::packet::{Packet, Payload};
use minetest_protocol::core::split::{split_payload, SplitAssembler};

#[allow(clippy::unwrap_used)]
fn bench_packet_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_encode_decode");
    let payload_sizes = [0usize, 64, 256, 490];

    for &size in &payload_sizes {
        let packet = Packet::reliable(257, 1, 65500, Payload::new(0x20, vec![0u8; size]));
        group.throughput(Throughput::Bytes(packet.encoded_len() as u64));

        group.bench_function(format!("encode_{size}b"), |b| {
            let mut buf = BytesMut::with_capacity(packet.encoded_len());
            b.iter(|| {
                buf.clear();
                packet.write(&mut buf);
                black_box(&buf);
            })
        });

        let encoded = packet.to_bytes();
        group.bench_function(format!("decode_{size}b"), |b| {
            b.iter(|| {
                let decoded = Packet::decode(encoded.clone());
                assert!(decoded.is_ok());
            })
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_split_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_reassembly");

    for &size in &[2_000usize, 20_000, 200_000] {
        let message = Bytes::from(vec![0x5au8; size]);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("split_{size}b"), |b| {
            b.iter(|| black_box(split_payload(&message, 495, 1).unwrap()))
        });

        let fragments = split_payload(&message, 495, 1).unwrap();
        group.bench_function(format!("reassemble_{size}b"), |b| {
            b.iter_batched(
                || (SplitAssembler::new(), fragments.clone()),
                |(mut assembler, fragments)| {
                    let mut out = None;
                    for fragment in fragments.into_iter().rev() {
                        out = assembler.add_fragment(fragment);
                    }
                    assert!(out.is_some());
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_packet_encode_decode, bench_split_reassembly);
criterion_main!(benches);
