use std::sync::Arc;

use log::{error, info, warn};

use super::{AudioBuffers, AudioStage, Controls, Processor, StageId};
use crate::backend::{Backend, BackendKind, Direction, DummyBackend, ProcessorSlot};
use crate::config::IoConfig;
use crate::device::DeviceInfo;
use crate::{Error, Result, MAX_BLOCK_SIZE};

/// A block-synchronous audio session.
///
/// Owns a backend and the [`Processor`] that the backend's callback runs.
/// Configuration (channel counts, block size, stage chain) is changed from
/// the control thread only; channel counts and block size are frozen while
/// the stream is open and the chain is frozen while it runs. Gain and the
/// safety flags are atomics and may change at any time.
///
/// # Example
///
/// ```
/// use saavy_decorr::{AudioBuffers, AudioIo, IoConfig};
///
/// let mut io = AudioIo::new(IoConfig::dummy(64, 48_000.0, 2, 0)).unwrap();
/// io.append(Box::new(|b: &mut AudioBuffers| b.output_mut(0).fill(0.25))).unwrap();
///
/// let mut out = vec![0.0; 64 * 2];
/// io.process_block(&[], &mut out).unwrap();
/// assert_eq!(out[0], 0.25);
/// assert_eq!(out[1], 0.0);
/// ```
pub struct AudioIo {
    backend: Box<dyn Backend>,
    processor: ProcessorSlot,
    controls: Arc<Controls>,
    frames_per_buffer: usize,
    sample_rate: f64,
    channels_in: usize,
    channels_out: usize,
    channels_bus: usize,
}

impl AudioIo {
    /// Build a closed session on the backend named by `config.backend`.
    pub fn new(config: IoConfig) -> Result<Self> {
        let backend: Box<dyn Backend> = match config.backend {
            BackendKind::Dummy => Box::new(DummyBackend::new()),
            #[cfg(feature = "hardware")]
            BackendKind::Hardware => Box::new(crate::backend::HardwareBackend::new()?),
            #[cfg(not(feature = "hardware"))]
            BackendKind::Hardware => {
                return Err(Error::Backend("built without the `hardware` feature".to_string()));
            }
        };
        Self::with_backend(config, backend)
    }

    /// Build a closed session on a caller-supplied backend.
    pub fn with_backend(config: IoConfig, backend: Box<dyn Backend>) -> Result<Self> {
        config.validate()?;

        let controls = Arc::new(Controls::new(
            config.gain,
            config.use_gain,
            config.zero_nans,
            config.clip_out,
            config.auto_zero_out,
        ));
        let buffers = AudioBuffers::new(config.frames_per_buffer, config.sample_rate);

        let mut io = Self {
            backend,
            processor: Some(Box::new(Processor::new(buffers, controls.clone()))),
            controls,
            frames_per_buffer: config.frames_per_buffer,
            sample_rate: config.sample_rate,
            channels_in: 0,
            channels_out: 0,
            channels_bus: 0,
        };

        io.set_channels_out(config.channels_out)?;
        io.set_channels_in(config.channels_in)?;
        io.set_channels_bus(config.channels_bus)?;

        info!(
            "audio io ({:?}): {} Hz, {} frames, {} out / {} in / {} bus",
            io.backend.kind(),
            io.sample_rate,
            io.frames_per_buffer,
            io.channels_out,
            io.channels_in,
            io.channels_bus
        );
        Ok(io)
    }

    // --- lifecycle ---------------------------------------------------------

    pub fn is_open(&self) -> bool {
        self.backend.is_open()
    }

    pub fn is_running(&self) -> bool {
        self.backend.is_running()
    }

    /// Closed → Open. Already open is a no-op.
    pub fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        self.backend
            .open(self.sample_rate, self.frames_per_buffer)
            .inspect_err(|e| error!("failed to open audio stream: {e}"))
    }

    /// Closed/Open → Running. Already running is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        self.sync_device_channels();
        self.backend
            .start(self.sample_rate, self.frames_per_buffer, &mut self.processor)
            .inspect_err(|e| error!("failed to start audio stream: {e}"))
    }

    /// Running → Open.
    pub fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        self.backend
            .stop(&mut self.processor)
            .inspect_err(|e| error!("failed to stop audio stream: {e}"))
    }

    /// Open/Running → Closed.
    pub fn close(&mut self) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }
        self.backend
            .close(&mut self.processor)
            .inspect_err(|e| error!("failed to close audio stream: {e}"))
    }

    /// Close and bring the stream back to the state it was in.
    pub fn reopen(&mut self) -> Result<()> {
        let was_running = self.is_running();
        let was_open = self.is_open();
        self.close()?;
        if was_running {
            self.start()
        } else if was_open {
            self.open()
        } else {
            Ok(())
        }
    }

    // --- stream parameters -------------------------------------------------

    pub fn frames_per_buffer(&self) -> usize {
        self.frames_per_buffer
    }

    /// Change the block size. Rejected while the stream is open.
    pub fn set_frames_per_buffer(&mut self, frames: usize) -> Result<()> {
        self.guard_closed("change frames per buffer")?;
        if frames == 0 || frames > MAX_BLOCK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "frames per buffer must be in 1..={MAX_BLOCK_SIZE}, got {frames}"
            )));
        }
        self.processor_mut()?.buffers_mut().set_frames_per_buffer(frames);
        self.frames_per_buffer = frames;
        Ok(())
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Change the stream sample rate.
    ///
    /// A rate the device does not support falls back to the device default.
    /// An open stream is reopened so the new rate takes effect.
    pub fn set_sample_rate(&mut self, sample_rate: f64) -> Result<()> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(Error::InvalidConfig(format!("sample rate must be positive, got {sample_rate}")));
        }
        let rate = if self.backend.supports_sample_rate(sample_rate) {
            sample_rate
        } else {
            let fallback = self.backend.device(Direction::Output).default_sample_rate;
            warn!("sample rate {sample_rate} Hz not supported, using device default {fallback} Hz");
            fallback
        };

        let was_running = self.is_running();
        let was_open = self.is_open();
        self.close()?;

        self.sample_rate = rate;
        self.processor_mut()?.buffers_mut().set_sample_rate(rate);

        if was_running {
            self.start()
        } else if was_open {
            self.open()
        } else {
            Ok(())
        }
    }

    /// Output channels held in the buffers.
    pub fn channels_out(&self) -> usize {
        self.channels_out
    }

    pub fn channels_in(&self) -> usize {
        self.channels_in
    }

    pub fn channels_bus(&self) -> usize {
        self.channels_bus
    }

    /// Output channels granted by the device. May be fewer than
    /// [`channels_out`](Self::channels_out); surplus buffer channels are
    /// processed but never reach hardware.
    pub fn channels_out_device(&self) -> usize {
        self.backend.device_channels(Direction::Output)
    }

    pub fn channels_in_device(&self) -> usize {
        self.backend.device_channels(Direction::Input)
    }

    /// Set the output channel count. `-1` takes every device channel.
    pub fn set_channels_out(&mut self, count: i32) -> Result<()> {
        self.set_channels(count, Direction::Output)
    }

    /// Set the input channel count. `-1` takes every device channel.
    pub fn set_channels_in(&mut self, count: i32) -> Result<()> {
        self.set_channels(count, Direction::Input)
    }

    /// Set the number of internal bus channels.
    pub fn set_channels_bus(&mut self, count: usize) -> Result<()> {
        self.guard_closed("change bus channels")?;
        self.processor_mut()?.buffers_mut().set_channels_bus(count);
        self.channels_bus = count;
        Ok(())
    }

    fn set_channels(&mut self, count: i32, direction: Direction) -> Result<()> {
        self.guard_closed(match direction {
            Direction::Input => "change input channels",
            Direction::Output => "change output channels",
        })?;
        if count < -1 {
            return Err(Error::InvalidConfig(format!(
                "{} channel count must be >= -1, got {count}",
                direction.label()
            )));
        }

        self.backend.configure_channels(count, direction);
        let granted = self.backend.device_channels(direction);
        let channels = if count < 0 { granted } else { count as usize };

        let buffers = self.processor_mut()?.buffers_mut();
        match direction {
            Direction::Input => buffers.set_channels_in(channels),
            Direction::Output => buffers.set_channels_out(channels),
        }
        match direction {
            Direction::Input => self.channels_in = channels,
            Direction::Output => self.channels_out = channels,
        }
        self.sync_device_channels();
        Ok(())
    }

    pub fn device(&self, direction: Direction) -> DeviceInfo {
        self.backend.device(direction)
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Fraction of the block period spent in the callback.
    pub fn cpu_load(&self) -> f64 {
        self.backend.cpu_load()
    }

    // --- stage chain -------------------------------------------------------

    pub fn append(&mut self, stage: Box<dyn AudioStage>) -> Result<StageId> {
        self.guard_stopped("append a stage")?;
        Ok(self.processor_mut()?.chain_mut().append(stage))
    }

    pub fn prepend(&mut self, stage: Box<dyn AudioStage>) -> Result<StageId> {
        self.guard_stopped("prepend a stage")?;
        Ok(self.processor_mut()?.chain_mut().prepend(stage))
    }

    /// Insert before `reference`; an unknown reference prepends.
    pub fn insert_before(&mut self, reference: StageId, stage: Box<dyn AudioStage>) -> Result<StageId> {
        self.guard_stopped("insert a stage")?;
        Ok(self.processor_mut()?.chain_mut().insert_before(reference, stage))
    }

    /// Insert after `reference`; an unknown reference appends.
    pub fn insert_after(&mut self, reference: StageId, stage: Box<dyn AudioStage>) -> Result<StageId> {
        self.guard_stopped("insert a stage")?;
        Ok(self.processor_mut()?.chain_mut().insert_after(reference, stage))
    }

    /// Take a stage out of the chain, handing it back.
    pub fn remove(&mut self, id: StageId) -> Result<Option<Box<dyn AudioStage>>> {
        self.guard_stopped("remove a stage")?;
        Ok(self.processor_mut()?.chain_mut().remove(id))
    }

    /// Borrow a registered stage as its concrete type.
    ///
    /// `Ok(None)` when `id` is not in the chain or the stage is not a `T`
    /// (see [`AudioStage::as_any_mut`]). Refused while running, like any
    /// other chain edit.
    pub fn stage_mut<T: AudioStage + 'static>(&mut self, id: StageId) -> Result<Option<&mut T>> {
        self.guard_stopped("reconfigure a stage")?;
        Ok(self.processor_mut()?.chain_mut().get_mut::<T>(id))
    }

    /// Install the single legacy callback, run before every stage.
    pub fn set_callback<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(&mut AudioBuffers) + Send + 'static,
    {
        self.guard_stopped("set the callback")?;
        self.processor_mut()?.set_callback(Some(Box::new(callback)));
        Ok(())
    }

    pub fn clear_callback(&mut self) -> Result<()> {
        self.guard_stopped("clear the callback")?;
        self.processor_mut()?.set_callback(None);
        Ok(())
    }

    // --- manual driving ----------------------------------------------------

    /// Run the legacy callback and the stage chain on the current buffers.
    ///
    /// No auto-zero, gain, guard or clip. Used to drive the engine by hand
    /// on the dummy backend.
    pub fn process_audio(&mut self) -> Result<()> {
        self.guard_stopped_unless_dummy("process audio")?;
        self.processor_mut()?.process_audio();
        Ok(())
    }

    /// Run one complete block on interleaved device-layout slices.
    pub fn process_block(&mut self, input: &[f32], output: &mut [f32]) -> Result<()> {
        self.guard_stopped_unless_dummy("process a block")?;
        self.processor_mut()?.process_interleaved(input, output);
        Ok(())
    }

    /// Buffers of the current block, unless a running callback owns them.
    pub fn buffers(&self) -> Option<&AudioBuffers> {
        self.processor.as_deref().map(Processor::buffers)
    }

    pub fn buffers_mut(&mut self) -> Option<&mut AudioBuffers> {
        self.processor.as_deref_mut().map(Processor::buffers_mut)
    }

    // --- controls ----------------------------------------------------------

    pub fn controls(&self) -> &Arc<Controls> {
        &self.controls
    }

    pub fn gain(&self) -> f32 {
        self.controls.gain()
    }

    /// Target master gain. Applied with a one-block ramp when gain control
    /// is on.
    pub fn set_gain(&self, gain: f32) {
        self.controls.set_gain(gain);
    }

    pub fn use_gain(&self) -> bool {
        self.controls.use_gain()
    }

    pub fn set_use_gain(&self, on: bool) {
        self.controls.set_use_gain(on);
    }

    pub fn zero_nans(&self) -> bool {
        self.controls.zero_nans()
    }

    pub fn set_zero_nans(&self, on: bool) {
        self.controls.set_zero_nans(on);
    }

    pub fn clip_out(&self) -> bool {
        self.controls.clip_out()
    }

    pub fn set_clip_out(&self, on: bool) {
        self.controls.set_clip_out(on);
    }

    pub fn auto_zero_out(&self) -> bool {
        self.controls.auto_zero()
    }

    pub fn set_auto_zero_out(&self, on: bool) {
        self.controls.set_auto_zero(on);
    }

    // --- internals ---------------------------------------------------------

    fn state_label(&self) -> &'static str {
        if self.is_running() {
            "running"
        } else if self.is_open() {
            "open"
        } else {
            "closed"
        }
    }

    fn guard_closed(&self, operation: &'static str) -> Result<()> {
        if self.is_open() {
            warn!("cannot {operation} while the stream is {}", self.state_label());
            return Err(Error::StreamActive {
                operation,
                state: self.state_label(),
            });
        }
        Ok(())
    }

    fn guard_stopped(&self, operation: &'static str) -> Result<()> {
        if self.is_running() {
            warn!("cannot {operation} while the stream is running");
            return Err(Error::StreamActive {
                operation,
                state: "running",
            });
        }
        Ok(())
    }

    /// The dummy backend never takes the processor, so it may be driven by
    /// hand in any state.
    fn guard_stopped_unless_dummy(&self, operation: &'static str) -> Result<()> {
        if self.backend.kind() == BackendKind::Dummy {
            return Ok(());
        }
        self.guard_stopped(operation)
    }

    fn processor_mut(&mut self) -> Result<&mut Processor> {
        self.processor
            .as_deref_mut()
            .ok_or_else(|| Error::Backend("audio processor is held by the stream".to_string()))
    }

    fn sync_device_channels(&mut self) {
        let input = self.backend.device_channels(Direction::Input);
        let output = self.backend.device_channels(Direction::Output);
        if let Some(processor) = self.processor.as_deref_mut() {
            processor.set_device_channels(input, output);
        }
    }
}

impl Drop for AudioIo {
    fn drop(&mut self) {
        if let Err(e) = self.backend.close(&mut self.processor) {
            error!("failed to close audio stream on drop: {e}");
        }
    }
}

impl std::fmt::Debug for AudioIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioIo")
            .field("backend", &self.backend.kind())
            .field("state", &self.state_label())
            .field("frames_per_buffer", &self.frames_per_buffer)
            .field("sample_rate", &self.sample_rate)
            .field("channels_in", &self.channels_in)
            .field("channels_out", &self.channels_out)
            .field("channels_bus", &self.channels_bus)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DUMMY_MAX_CHANNELS;

    fn dummy(frames: usize, out: i32, input: i32) -> AudioIo {
        AudioIo::new(IoConfig::dummy(frames, 44_100.0, out, input)).unwrap()
    }

    #[test]
    fn test_lifecycle() {
        let mut io = dummy(64, 2, 0);
        assert!(!io.is_open());

        io.open().unwrap();
        assert!(io.is_open());
        assert!(!io.is_running());

        io.start().unwrap();
        assert!(io.is_running());

        io.stop().unwrap();
        assert!(io.is_open());
        assert!(!io.is_running());

        io.close().unwrap();
        assert!(!io.is_open());
    }

    #[test]
    fn test_reopen_restores_state() {
        let mut io = dummy(64, 2, 0);
        io.start().unwrap();
        io.reopen().unwrap();
        assert!(io.is_running());

        io.stop().unwrap();
        io.reopen().unwrap();
        assert!(io.is_open());
        assert!(!io.is_running());
    }

    #[test]
    fn test_channel_counts_size_buffers() {
        let io = dummy(32, 3, 1);
        let buffers = io.buffers().unwrap();
        assert_eq!(buffers.channels_out(), 3);
        assert_eq!(buffers.output_block().len(), 3 * 32);
        assert_eq!(buffers.input_block().len(), 32);
    }

    #[test]
    fn test_all_channels_resolves_to_device() {
        let io = dummy(32, -1, -1);
        assert_eq!(io.channels_out(), DUMMY_MAX_CHANNELS);
        assert_eq!(io.channels_in(), DUMMY_MAX_CHANNELS);
        assert_eq!(io.channels_out_device(), DUMMY_MAX_CHANNELS);
    }

    #[test]
    fn test_virtual_channels_beyond_device() {
        let io = dummy(32, 100, 0);
        assert_eq!(io.channels_out(), 100);
        assert_eq!(io.channels_out_device(), DUMMY_MAX_CHANNELS);
    }

    #[test]
    fn test_reconfigure_rejected_while_open() {
        let mut io = dummy(64, 2, 0);
        io.open().unwrap();

        assert!(matches!(io.set_channels_out(4), Err(Error::StreamActive { .. })));
        assert!(matches!(io.set_frames_per_buffer(128), Err(Error::StreamActive { .. })));
        assert!(matches!(io.set_channels_bus(1), Err(Error::StreamActive { .. })));
        assert_eq!(io.channels_out(), 2);
        assert_eq!(io.frames_per_buffer(), 64);

        io.close().unwrap();
        io.set_frames_per_buffer(128).unwrap();
        assert_eq!(io.buffers().unwrap().output_block().len(), 256);
    }

    #[test]
    fn test_chain_edits_rejected_while_running() {
        let mut io = dummy(64, 2, 0);
        io.start().unwrap();
        assert!(io.append(Box::new(|_: &mut AudioBuffers| {})).is_err());
        io.stop().unwrap();
        assert!(io.append(Box::new(|_: &mut AudioBuffers| {})).is_ok());
    }

    #[test]
    fn test_invalid_frames_rejected() {
        let mut io = dummy(64, 2, 0);
        assert!(matches!(io.set_frames_per_buffer(0), Err(Error::InvalidConfig(_))));
        assert!(matches!(
            io.set_frames_per_buffer(MAX_BLOCK_SIZE + 1),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_set_sample_rate_updates_buffers() {
        let mut io = dummy(64, 2, 0);
        io.start().unwrap();
        io.set_sample_rate(48_000.0).unwrap();
        assert_eq!(io.sample_rate(), 48_000.0);
        assert_eq!(io.buffers().unwrap().sample_rate(), 48_000.0);
        assert!(io.is_running());
    }

    #[test]
    fn test_callback_can_be_cleared() {
        let mut io = dummy(4, 1, 0);
        io.set_callback(|b: &mut AudioBuffers| b.output_mut(0).fill(1.0)).unwrap();
        io.process_audio().unwrap();
        assert_eq!(io.buffers().unwrap().output(0), &[1.0; 4]);

        io.clear_callback().unwrap();
        io.buffers_mut().unwrap().zero_output();
        io.process_audio().unwrap();
        assert_eq!(io.buffers().unwrap().output(0), &[0.0; 4]);
    }
}
