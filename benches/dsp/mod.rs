//! Benchmarks for low-level DSP primitives.

mod convolve;
mod ir;

pub use convolve::bench_convolve;
pub use ir::bench_ir;
