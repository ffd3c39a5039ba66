//! Benchmarks for a full block: bus source, decorrelation, safety net.
//!
//! These run the same path the device callback runs, on the dummy backend.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_decorr::{AudioBuffers, AudioIo, Decorrelation, IoConfig};

use crate::BLOCK_SIZES;

fn engine(frames: usize, outputs: usize, ir_len: usize) -> AudioIo {
    let config = IoConfig::dummy(frames, 48_000.0, outputs as i32, 0).bus_channels(1);
    let mut io = AudioIo::new(config).expect("dummy engine");
    io.set_use_gain(true);

    // Deterministic pseudo-noise into bus 0
    let mut state = 0x2545_f491u32;
    io.append(Box::new(move |b: &mut AudioBuffers| {
        for s in b.bus_mut(0).iter_mut() {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            *s = (state as f32 / u32::MAX as f32) * 0.2 - 0.1;
        }
    }))
    .expect("append source");

    let mut bank = Decorrelation::new(ir_len, 0, outputs, Some(1000));
    bank.configure(&io, 0, true);
    io.append(Box::new(bank)).expect("append decorrelation");
    io
}

pub fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/pipeline");
    let input: Vec<f32> = Vec::new();

    for &size in BLOCK_SIZES {
        // === STEREO: 2 outputs, short IR ===
        let mut io = engine(size, 2, 512);
        let mut out = vec![0.0f32; size * 2];
        group.bench_with_input(BenchmarkId::new("stereo_512", size), &size, |b, _| {
            b.iter(|| io.process_block(black_box(input.as_slice()), black_box(&mut out)))
        });

        // === SURROUND: 8 outputs, long IR ===
        let mut io = engine(size, 8, 2048);
        let mut out = vec![0.0f32; size * 8];
        group.bench_with_input(BenchmarkId::new("8ch_2048", size), &size, |b, _| {
            b.iter(|| io.process_block(black_box(input.as_slice()), black_box(&mut out)))
        });
    }

    group.finish();
}
