//! Codec benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glow_core::{
    build_action_packet, build_brightness_body, decode_state, parse_fields, varint, Action,
    Brightness, Notification,
};

const STATE_CAPTURE: &[u8] = &[
    0x08, 0xc3, 0x92, 0xb0, 0x43, 0x10, 0x01, 0x18, 0xaa, 0xc8, 0x9c, 0x15, 0x22, 0x1b, 0x9a,
    0x01, 0x18, 0x08, 0x01, 0x10, 0xdb, 0xc2, 0x04, 0x18, 0xa0, 0xf7, 0x36, 0x20, 0x00, 0x28,
    0x00, 0x30, 0x00, 0x3a, 0x04, 0x08, 0x03, 0x10, 0x06, 0x40, 0x64,
];

fn varint_benchmark(c: &mut Criterion) {
    let encoded = varint::encode(141_297_904);

    c.bench_function("varint_encode", |b| {
        b.iter(|| black_box(varint::encode(black_box(141_297_904))))
    });

    c.bench_function("varint_decode", |b| {
        b.iter(|| black_box(varint::decode(&encoded, 0).unwrap()))
    });
}

fn parse_benchmark(c: &mut Criterion) {
    c.bench_function("parse_fields", |b| {
        b.iter(|| black_box(parse_fields(black_box(STATE_CAPTURE))))
    });

    c.bench_function("decode_state", |b| {
        b.iter(|| black_box(decode_state(black_box(STATE_CAPTURE)).unwrap()))
    });

    c.bench_function("inspect_notification", |b| {
        b.iter(|| black_box(Notification::inspect(black_box(STATE_CAPTURE))))
    });
}

fn packet_benchmark(c: &mut Criterion) {
    let body = Action::TurnOn.body();

    c.bench_function("build_action_packet", |b| {
        b.iter(|| black_box(build_action_packet(black_box(141_297_904), &body)))
    });

    c.bench_function("build_brightness_packet", |b| {
        b.iter(|| {
            let body = build_brightness_body(Brightness::Pct80, 900_000);
            black_box(build_action_packet(141_297_904, &body))
        })
    });
}

criterion_group!(benches, varint_benchmark, parse_benchmark, packet_benchmark);
criterion_main!(benches);
