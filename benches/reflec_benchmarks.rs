// ABOUTME: Benchmarks for the packet codec and ring buffer, the two hot paths per forwarded byte

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use reflec::packet::{decode_one, Marker, Packet};
use reflec::Ring;
use std::io::Cursor;

fn bench_packet_encode(c: &mut Criterion) {
    let payload = Bytes::from(vec![0x42u8; 1024]);
    c.bench_function("packet_encode_1kb", |b| {
        b.iter(|| Packet::new(black_box(Marker::Data), black_box(payload.clone())))
    });
}

fn bench_packet_decode(c: &mut Criterion) {
    let packet = Packet::new(Marker::Data, Bytes::from(vec![0x42u8; 1024]));
    let raw = packet.raw_bytes().clone();
    c.bench_function("packet_decode_1kb", |b| {
        b.iter(|| {
            let mut cursor = Cursor::new(&raw[..]);
            decode_one(black_box(&mut cursor)).unwrap()
        })
    });
}

fn bench_ring_push(c: &mut Criterion) {
    let ring: Ring<Packet> = Ring::new(64);
    let packet = Packet::new(Marker::Data, Bytes::from(vec![0x42u8; 1024]));
    c.bench_function("ring_push", |b| {
        b.iter(|| ring.push(black_box(packet.clone())))
    });
}

fn bench_ring_get_caught_up(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ring: Ring<Packet> = Ring::new(64);
    let packet = Packet::new(Marker::Data, Bytes::from(vec![0x42u8; 1024]));
    let mut reader = ring.reader();
    c.bench_function("ring_get_caught_up", |b| {
        b.iter(|| {
            ring.push(packet.clone());
            rt.block_on(async { black_box(ring.get(&mut reader).await) })
        })
    });
}

criterion_group!(
    benches,
    bench_packet_encode,
    bench_packet_decode,
    bench_ring_push,
    bench_ring_get_caught_up
);
criterion_main!(benches);
