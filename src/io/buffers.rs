//! Planar sample buffers for one audio session.

/// Per-direction sample storage for the current block.
///
/// Input, output and bus buffers are planar (channel-major): channel `c`
/// occupies `[c × frames, (c + 1) × frames)`. Every buffer is always exactly
/// `channels × frames_per_buffer` long, and a direction with zero channels
/// holds no allocation at all.
///
/// This is also the view a stage gets of the block: it may read any input or
/// bus channel and read-modify-write any output channel.
///
/// # Panics
///
/// Channel accessors panic when the channel index is out of range, like
/// slice indexing does.
#[derive(Debug, Clone)]
pub struct AudioBuffers {
    frames: usize,
    sample_rate: f64,
    channels_in: usize,
    channels_out: usize,
    channels_bus: usize,
    input: Vec<f32>,
    output: Vec<f32>,
    bus: Vec<f32>,
    scratch: Vec<f32>,
}

impl AudioBuffers {
    pub fn new(frames_per_buffer: usize, sample_rate: f64) -> Self {
        Self {
            frames: frames_per_buffer,
            sample_rate,
            channels_in: 0,
            channels_out: 0,
            channels_bus: 0,
            input: Vec::new(),
            output: Vec::new(),
            bus: Vec::new(),
            scratch: vec![0.0; frames_per_buffer],
        }
    }

    pub fn frames_per_buffer(&self) -> usize {
        self.frames
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn channels_in(&self) -> usize {
        self.channels_in
    }

    pub fn channels_out(&self) -> usize {
        self.channels_out
    }

    pub fn channels_bus(&self) -> usize {
        self.channels_bus
    }

    pub fn input(&self, channel: usize) -> &[f32] {
        channel_slice(&self.input, channel, self.channels_in, self.frames, "input")
    }

    pub fn input_mut(&mut self, channel: usize) -> &mut [f32] {
        channel_slice_mut(&mut self.input, channel, self.channels_in, self.frames, "input")
    }

    pub fn output(&self, channel: usize) -> &[f32] {
        channel_slice(&self.output, channel, self.channels_out, self.frames, "output")
    }

    pub fn output_mut(&mut self, channel: usize) -> &mut [f32] {
        channel_slice_mut(&mut self.output, channel, self.channels_out, self.frames, "output")
    }

    pub fn bus(&self, channel: usize) -> &[f32] {
        channel_slice(&self.bus, channel, self.channels_bus, self.frames, "bus")
    }

    pub fn bus_mut(&mut self, channel: usize) -> &mut [f32] {
        channel_slice_mut(&mut self.bus, channel, self.channels_bus, self.frames, "bus")
    }

    /// Read a bus channel while writing an output channel.
    pub fn bus_and_output_mut(&mut self, bus: usize, output: usize) -> (&[f32], &mut [f32]) {
        (
            channel_slice(&self.bus, bus, self.channels_bus, self.frames, "bus"),
            channel_slice_mut(&mut self.output, output, self.channels_out, self.frames, "output"),
        )
    }

    /// Read an input channel while writing an output channel.
    pub fn input_and_output_mut(&mut self, input: usize, output: usize) -> (&[f32], &mut [f32]) {
        (
            channel_slice(&self.input, input, self.channels_in, self.frames, "input"),
            channel_slice_mut(&mut self.output, output, self.channels_out, self.frames, "output"),
        )
    }

    /// Single-channel work area, `frames_per_buffer` long. Contents are not
    /// preserved between stages.
    pub fn scratch_mut(&mut self) -> &mut [f32] {
        &mut self.scratch
    }

    /// Every output channel, planar.
    pub fn output_block(&self) -> &[f32] {
        &self.output
    }

    pub fn output_block_mut(&mut self) -> &mut [f32] {
        &mut self.output
    }

    pub fn input_block(&self) -> &[f32] {
        &self.input
    }

    pub fn input_block_mut(&mut self) -> &mut [f32] {
        &mut self.input
    }

    pub fn zero_output(&mut self) {
        self.output.fill(0.0);
    }

    pub fn zero_bus(&mut self) {
        self.bus.fill(0.0);
    }

    pub(crate) fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    pub(crate) fn set_channels_in(&mut self, channels: usize) {
        self.channels_in = channels;
        reallocate(&mut self.input, channels, self.frames);
    }

    pub(crate) fn set_channels_out(&mut self, channels: usize) {
        self.channels_out = channels;
        reallocate(&mut self.output, channels, self.frames);
    }

    pub(crate) fn set_channels_bus(&mut self, channels: usize) {
        self.channels_bus = channels;
        reallocate(&mut self.bus, channels, self.frames);
    }

    /// Change the block length, reallocating every direction.
    pub(crate) fn set_frames_per_buffer(&mut self, frames: usize) {
        self.frames = frames;
        reallocate(&mut self.input, self.channels_in, frames);
        reallocate(&mut self.output, self.channels_out, frames);
        reallocate(&mut self.bus, self.channels_bus, frames);
        self.scratch = vec![0.0; frames];
    }
}

/// Resize to exactly `channels × frames`, zeroed. Zero channels frees the
/// allocation.
fn reallocate(buffer: &mut Vec<f32>, channels: usize, frames: usize) {
    let len = channels * frames;
    if len == 0 {
        *buffer = Vec::new();
    } else {
        *buffer = vec![0.0; len];
    }
}

#[inline]
fn channel_slice<'a>(buffer: &'a [f32], channel: usize, channels: usize, frames: usize, what: &str) -> &'a [f32] {
    assert!(channel < channels, "{what} channel {channel} out of range ({channels} channels)");
    &buffer[channel * frames..(channel + 1) * frames]
}

#[inline]
fn channel_slice_mut<'a>(
    buffer: &'a mut [f32],
    channel: usize,
    channels: usize,
    frames: usize,
    what: &str,
) -> &'a mut [f32] {
    assert!(channel < channels, "{what} channel {channel} out of range ({channels} channels)");
    &mut buffer[channel * frames..(channel + 1) * frames]
}
