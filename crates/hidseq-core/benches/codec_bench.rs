//! Criterion benchmarks for the frame codec and the key registry.
//!
//! Every step of a sequence encodes at most a handful of frames and touches
//! the registry once, so both must stay far below the 1 ms step floor.
//!
//! Run with:
//! ```bash
//! cargo bench --package hidseq-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hidseq_core::protocol::codec::decode_stream;
use hidseq_core::{
    decode_frame, encode_frame, resolve_key_name, Frame, KeyRegistry, Owner, PhysicalKey,
};

// ── Frame fixtures ────────────────────────────────────────────────────────────

fn fixtures() -> Vec<(&'static str, Frame)> {
    vec![
        ("press", Frame::Press(PhysicalKey::new(b'a'))),
        ("release", Frame::Release(PhysicalKey::new(0x81))),
        ("clear_all", Frame::ClearAll),
        ("mouse_move", Frame::mouse_move(-320, 180, 120)),
        ("double_click", Frame::MouseDoubleClick),
    ]
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_frame");
    for (name, frame) in fixtures() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &frame, |b, f| {
            b.iter(|| encode_frame(black_box(f)))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_frame");
    for (name, frame) in fixtures() {
        let bytes = encode_frame(&frame);
        group.bench_with_input(BenchmarkId::from_parameter(name), &bytes, |b, bytes| {
            b.iter(|| decode_frame(black_box(bytes)))
        });
    }
    group.finish();

    let stream: Vec<u8> = fixtures()
        .iter()
        .cycle()
        .take(64)
        .flat_map(|(_, f)| encode_frame(f))
        .collect();
    c.bench_function("decode_stream_64_frames", |b| {
        b.iter(|| decode_stream(black_box(&stream)))
    });
}

fn bench_registry(c: &mut Criterion) {
    let owners: Vec<Owner> = (0..8)
        .map(|i| Owner::parallel(&format!("cmd{i}")))
        .collect();
    let key = PhysicalKey::new(b'k');

    c.bench_function("registry_shared_press_release_8_owners", |b| {
        b.iter(|| {
            let mut registry = KeyRegistry::new();
            for owner in &owners {
                black_box(registry.press(owner, key, false));
            }
            for owner in &owners {
                black_box(registry.release(owner, key, false));
            }
            registry
        })
    });

    c.bench_function("resolve_key_name", |b| {
        b.iter(|| resolve_key_name(black_box("lshift")))
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_registry);
criterion_main!(benches);
