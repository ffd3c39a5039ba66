//! Complete engine blocks, from interleaved input to interleaved output.

mod pipeline;

pub use pipeline::bench_pipeline;
