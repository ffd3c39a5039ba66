//! Benchmarks for tail-carrying block convolution.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_decorr::decorrelation::IrSynth;
use saavy_decorr::dsp::TailConvolver;

use crate::BLOCK_SIZES;

/// IR lengths worth comparing: short, typical, long.
const IR_LENGTHS: &[usize] = &[256, 1024, 4096];

pub fn bench_convolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/convolve");

    for &ir_len in IR_LENGTHS {
        let ir = IrSynth::new(ir_len).render(1000);

        for &size in BLOCK_SIZES {
            // Dense signal, every sample nonzero
            let input: Vec<f32> = (0..size).map(|i| ((i * 31 % 97) as f32 / 48.0) - 1.0).collect();
            let mut out = vec![0.0f32; size];
            let mut conv = TailConvolver::new(ir_len);

            group.bench_with_input(
                BenchmarkId::new(format!("ir_{ir_len}"), size),
                &size,
                |b, _| {
                    b.iter(|| {
                        out.fill(0.0);
                        conv.process_add(black_box(&ir), black_box(&input), black_box(&mut out));
                    })
                },
            );
        }
    }

    group.finish();
}
