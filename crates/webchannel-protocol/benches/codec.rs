//! Codec benchmarks for webchannel-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use serde_json::json;
use webchannel_core::Message;
use webchannel_protocol::{codec, Frame};

fn send_frame() -> Frame {
    Frame::send(
        "default",
        Message::broadcast(json!({"color": "bg-red-500", "tab": 3}))
            .with_callback_key("set-bg-color"),
    )
}

fn bench_encode(c: &mut Criterion) {
    let frame = send_frame();
    let size = codec::encode(&frame).unwrap().len();

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function("send", |b| b.iter(|| codec::encode(black_box(&frame))));
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let encoded = codec::encode(&send_frame()).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("send", |b| b.iter(|| codec::decode(black_box(&encoded))));
    group.finish();
}

fn bench_connections_update(c: &mut Criterion) {
    let frame = Frame::connections("default", 12);

    c.bench_function("roundtrip_connections", |b| {
        b.iter(|| {
            let encoded = codec::encode(black_box(&frame)).unwrap();
            codec::decode(black_box(&encoded)).unwrap()
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_connections_update);
criterion_main!(benches);
