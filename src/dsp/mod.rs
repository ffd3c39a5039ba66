//! Low-level DSP primitives used by the I/O engine and the decorrelator.
//!
//! These components are allocation-free on the processing path and safe to
//! call from the audio thread.

/// Overlap-add block convolution with a carried tail.
pub mod convolve;
/// Interleaved ⇄ planar sample layout conversion.
pub mod interleave;
/// Gain ramp, non-finite guard and hard clip.
pub mod safety;

pub use convolve::TailConvolver;
pub use safety::GainRamp;
