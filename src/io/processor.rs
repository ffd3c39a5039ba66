//! The per-block callback body and its lock-free control surface.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use super::{AudioBuffers, StageChain};
use crate::dsp::interleave::{deinterleave, interleave};
use crate::dsp::safety::{hard_clip, zero_non_finite, GainRamp};

/// Legacy single callback, run ahead of the stage chain.
pub type Callback = Box<dyn FnMut(&mut AudioBuffers) + Send>;

/// Settings the control thread may change while the stream runs.
///
/// Shared between the engine and the processor through an `Arc`. Every field
/// is an atomic read once per block, so a change lands on the next block
/// boundary.
#[derive(Debug)]
pub struct Controls {
    gain: AtomicU32,
    use_gain: AtomicBool,
    zero_nans: AtomicBool,
    clip_out: AtomicBool,
    auto_zero: AtomicBool,
}

impl Controls {
    pub fn new(gain: f32, use_gain: bool, zero_nans: bool, clip_out: bool, auto_zero: bool) -> Self {
        Self {
            gain: AtomicU32::new(gain.to_bits()),
            use_gain: AtomicBool::new(use_gain),
            zero_nans: AtomicBool::new(zero_nans),
            clip_out: AtomicBool::new(clip_out),
            auto_zero: AtomicBool::new(auto_zero),
        }
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub fn use_gain(&self) -> bool {
        self.use_gain.load(Ordering::Relaxed)
    }

    pub fn set_use_gain(&self, on: bool) {
        self.use_gain.store(on, Ordering::Relaxed);
    }

    pub fn zero_nans(&self) -> bool {
        self.zero_nans.load(Ordering::Relaxed)
    }

    pub fn set_zero_nans(&self, on: bool) {
        self.zero_nans.store(on, Ordering::Relaxed);
    }

    pub fn clip_out(&self) -> bool {
        self.clip_out.load(Ordering::Relaxed)
    }

    pub fn set_clip_out(&self, on: bool) {
        self.clip_out.store(on, Ordering::Relaxed);
    }

    pub fn auto_zero(&self) -> bool {
        self.auto_zero.load(Ordering::Relaxed)
    }

    pub fn set_auto_zero(&self, on: bool) {
        self.auto_zero.store(on, Ordering::Relaxed);
    }
}

impl Default for Controls {
    fn default() -> Self {
        Self::new(1.0, false, true, true, true)
    }
}

/// Everything the audio thread touches.
///
/// Exactly one owner at a time: the engine while the stream is stopped, the
/// backend's callback while it runs. Never shared, never locked.
pub struct Processor {
    buffers: AudioBuffers,
    chain: StageChain,
    callback: Option<Callback>,
    controls: Arc<Controls>,
    ramp: GainRamp,
    device_in: usize,
    device_out: usize,
}

impl Processor {
    pub fn new(buffers: AudioBuffers, controls: Arc<Controls>) -> Self {
        let ramp = GainRamp::new(controls.gain());
        Self {
            buffers,
            chain: StageChain::new(),
            callback: None,
            controls,
            ramp,
            device_in: 0,
            device_out: 0,
        }
    }

    pub fn buffers(&self) -> &AudioBuffers {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut AudioBuffers {
        &mut self.buffers
    }

    pub fn chain(&self) -> &StageChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut StageChain {
        &mut self.chain
    }

    pub fn controls(&self) -> &Arc<Controls> {
        &self.controls
    }

    pub fn set_callback(&mut self, callback: Option<Callback>) {
        self.callback = callback;
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Device channel counts used for (de)interleaving.
    pub fn device_channels(&self) -> (usize, usize) {
        (self.device_in, self.device_out)
    }

    pub(crate) fn set_device_channels(&mut self, input: usize, output: usize) {
        self.device_in = input;
        self.device_out = output;
    }

    /// Gain ramp start point for the next block.
    pub fn ramp_gain(&self) -> f32 {
        self.ramp.previous()
    }

    /// Run the legacy callback and every stage on the current buffers.
    pub fn process_audio(&mut self) {
        if let Some(callback) = self.callback.as_mut() {
            callback(&mut self.buffers);
        }
        self.chain.process(&mut self.buffers);
    }

    /// One full device block.
    ///
    /// `input` holds `frames × device_in` interleaved samples and `output`
    /// receives `frames × device_out`. A slice too short for its direction
    /// is treated as silence (input) or filled with silence (output).
    pub fn process_interleaved(&mut self, input: &[f32], output: &mut [f32]) {
        let frames = self.buffers.frames_per_buffer();
        let channels_in = self.buffers.channels_in();
        let channels_out = self.buffers.channels_out();

        if input.len() >= frames * self.device_in {
            deinterleave(input, self.device_in, self.buffers.input_block_mut(), channels_in, frames);
        } else {
            self.buffers.input_block_mut().fill(0.0);
        }

        if self.controls.auto_zero() {
            self.buffers.zero_output();
        }

        self.process_audio();

        let block = self.buffers.output_block_mut();
        if self.controls.use_gain() {
            self.ramp.apply(block, frames, self.controls.gain());
        } else {
            // Track the target so enabling gain starts from the current value
            self.ramp.reset(self.controls.gain());
        }
        if self.controls.zero_nans() {
            zero_non_finite(block);
        }
        if self.controls.clip_out() {
            hard_clip(block);
        }

        if output.len() >= frames * self.device_out {
            interleave(self.buffers.output_block(), channels_out, output, self.device_out, frames);
        } else {
            output.fill(0.0);
        }
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("buffers", &self.buffers)
            .field("chain", &self.chain)
            .field("callback", &self.callback.is_some())
            .field("controls", &self.controls)
            .field("device_in", &self.device_in)
            .field("device_out", &self.device_out)
            .finish()
    }
}
