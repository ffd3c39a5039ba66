//! Conversion between interleaved device layout and per-channel blocks.

/*
Sample Layouts
==============

Devices and processing code disagree on how a multichannel block is laid out
in memory.

  interleaved     One frame after another, each frame holding one sample per
                  channel. This is what drivers hand us.

                    [L0 R0 L1 R1 L2 R2 ...]

  planar          One channel after another, each channel a contiguous run of
  (channel-major) `frames` samples. This is what stages want, because a filter
                  walks one channel at a time.

                    [L0 L1 L2 ... | R0 R1 R2 ...]

Channel c, frame i lives at:

    interleaved[i × channels + c]
    planar[c × frames + i]

The device and the engine do not always agree on channel count either. The
engine may carry extra virtual channels that never reach hardware, or the
device may expose more channels than the engine asked for. Both functions
below copy the channels the two sides have in common; surplus planar channels
are left alone and surplus device channels are written as silence.
*/

/// Split an interleaved device block into planar channels.
///
/// Copies `min(src_channels, dst_channels)` channels. Planar channels beyond
/// that are left untouched.
#[inline]
pub fn deinterleave(src: &[f32], src_channels: usize, dst: &mut [f32], dst_channels: usize, frames: usize) {
    let shared = src_channels.min(dst_channels);
    if shared == 0 || frames == 0 {
        return;
    }
    debug_assert!(src.len() >= frames * src_channels);
    debug_assert!(dst.len() >= frames * dst_channels);

    for c in 0..shared {
        let channel = &mut dst[c * frames..(c + 1) * frames];
        for (i, sample) in channel.iter_mut().enumerate() {
            *sample = src[i * src_channels + c];
        }
    }
}

/// Merge planar channels into an interleaved device block.
///
/// Device channels with no planar counterpart are written as silence.
#[inline]
pub fn interleave(src: &[f32], src_channels: usize, dst: &mut [f32], dst_channels: usize, frames: usize) {
    if dst_channels == 0 || frames == 0 {
        return;
    }
    debug_assert!(src.len() >= frames * src_channels);
    debug_assert!(dst.len() >= frames * dst_channels);

    let shared = src_channels.min(dst_channels);
    for (i, frame) in dst.chunks_exact_mut(dst_channels).take(frames).enumerate() {
        for (c, sample) in frame.iter_mut().enumerate() {
            *sample = if c < shared { src[c * frames + i] } else { 0.0 };
        }
    }
}
