//! Codec benchmarks for parley-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use parley_protocol::{codec, ServerEnvelope};

fn bench_encode_message(c: &mut Criterion) {
    let envelope = ServerEnvelope::Message {
        room: "lobby".into(),
        sender: "alice".into(),
        content: "x".repeat(64),
        timestamp: 1_700_000_000_000,
        reply_to: None,
    };

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(64));
    group.bench_function("message_64B", |b| {
        b.iter(|| codec::encode(black_box(&envelope)))
    });
    group.finish();
}

fn bench_decode_message(c: &mut Criterion) {
    let raw = format!(
        r#"{{"kind": "message", "room": "lobby", "content": "{}"}}"#,
        "x".repeat(64)
    );

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(raw.len() as u64));
    group.bench_function("message_64B", |b| b.iter(|| codec::decode(black_box(&raw))));
    group.finish();
}

fn bench_decode_invalid(c: &mut Criterion) {
    let raw = r#"{"kind": "message", "room": "", "timestamp": 12}"#;

    c.bench_function("decode_invalid", |b| b.iter(|| codec::decode(black_box(raw))));
}

criterion_group!(
    benches,
    bench_encode_message,
    bench_decode_message,
    bench_decode_invalid
);
criterion_main!(benches);
