//! Output safety net: ramped gain, non-finite guard, hard clip.

/*
The Safety Net
==============

Whatever the stages produce, three cheap passes run over the output buffer
before it reaches the device. They run after every stage, so no stage can
assume any of them has already happened.

Gain Ramp
---------

Jumping a gain from one value to another between blocks puts a step into
the waveform, which is heard as a click ("zipper noise" when a fader moves).
Instead the gain is swept linearly across the block:

    step     = (target - previous) / frames
    gain[i]  = previous + i × step

    gain
      1.0 ──────┐
                 ╲
                  ╲  ← one block
                   ╲
      0.5           └──────────
          block k   block k+1

The sweep starts exactly at the previous block's gain and the next block
starts exactly at the target, so consecutive samples never see a gain change
larger than `step`.

Non-finite Guard
----------------

A NaN or infinity that reaches a DAC is at best silence and at worst a full
scale burst. Any sample that is not finite is replaced by 0.0.

Hard Clip
---------

Samples outside [-1, +1] are pinned to the nearest bound. This is not a
limiter; it only stops an overloaded mix from wrapping or exceeding the
converter's range. NaN compares false against both bounds and passes through
unchanged, so clip alone never hides a NaN.
*/

/// Linear gain ramp carried across blocks.
#[derive(Debug, Clone, Copy)]
pub struct GainRamp {
    previous: f32,
}

impl GainRamp {
    pub fn new(initial: f32) -> Self {
        Self { previous: initial }
    }

    /// Gain applied at the end of the last processed block.
    pub fn previous(&self) -> f32 {
        self.previous
    }

    /// Jump to `gain` without ramping.
    pub fn reset(&mut self, gain: f32) {
        self.previous = gain;
    }

    /// Per-sample increment a block of `frames` would use to reach `target`.
    #[inline]
    pub fn step(&self, target: f32, frames: usize) -> f32 {
        if frames == 0 {
            0.0
        } else {
            (target - self.previous) / frames as f32
        }
    }

    /// Ramp every channel of a planar block from the previous gain to `target`.
    ///
    /// Each channel gets the same sweep. The ramp state advances once per
    /// block, not per channel.
    pub fn apply(&mut self, planar: &mut [f32], frames: usize, target: f32) {
        if frames == 0 {
            return;
        }
        let step = self.step(target, frames);
        for channel in planar.chunks_exact_mut(frames) {
            let mut gain = self.previous;
            for sample in channel.iter_mut() {
                *sample *= gain;
                gain += step;
            }
        }
        self.previous = target;
    }
}

impl Default for GainRamp {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Replace every non-finite sample with silence.
#[inline]
pub fn zero_non_finite(buffer: &mut [f32]) {
    for sample in buffer.iter_mut() {
        if !sample.is_finite() {
            *sample = 0.0;
        }
    }
}

/// Pin samples to [-1, +1]. NaN passes through.
#[inline]
pub fn hard_clip(buffer: &mut [f32]) {
    for sample in buffer.iter_mut() {
        if *sample < -1.0 {
            *sample = -1.0;
        } else if *sample > 1.0 {
            *sample = 1.0;
        }
    }
}
