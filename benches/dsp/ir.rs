//! Benchmarks for random-phase IR synthesis.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_decorr::decorrelation::IrSynth;

pub fn bench_ir(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/ir");

    for &len in &[64usize, 1024, 8192] {
        let mut synth = IrSynth::new(len);
        let mut seed = 0u64;
        group.bench_with_input(BenchmarkId::new("render", len), &len, |b, _| {
            b.iter(|| {
                seed = seed.wrapping_add(1);
                black_box(synth.render(black_box(seed)))
            })
        });
    }

    group.finish();
}
