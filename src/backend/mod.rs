//! Audio backends: the device-facing half of the I/O engine.
//!
//! A backend owns the stream lifecycle (open, start, stop, close) and the
//! device channel counts. The engine hands it a processor slot; a backend
//! that runs its own callback thread moves the processor out of the slot on
//! `start` and puts it back on `stop`, so the callback is always the single
//! owner of the sample buffers while the stream runs.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::device::DeviceInfo;
use crate::io::Processor;
use crate::Result;

/// No-op backend for hardware-free, deterministic driving.
pub mod dummy;
/// cpal-backed backend for real devices.
#[cfg(feature = "hardware")]
pub mod hardware;

pub use dummy::DummyBackend;
#[cfg(feature = "hardware")]
pub use hardware::HardwareBackend;

/// Slot the engine lends to a backend for the lifetime of a stream.
pub type ProcessorSlot = Option<Box<Processor>>;

/// Which backend an [`AudioIo`](crate::io::AudioIo) is built on.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Hardware,
    Dummy,
}

impl Default for BackendKind {
    fn default() -> Self {
        if cfg!(feature = "hardware") {
            BackendKind::Hardware
        } else {
            BackendKind::Dummy
        }
    }
}

/// Stream direction.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// Device-facing capability set.
///
/// Every fallible operation either succeeds and advances the stream state or
/// returns an error and leaves the state as it was. Backends log their own
/// diagnostics; nothing here may panic across the audio callback.
pub trait Backend {
    fn kind(&self) -> BackendKind;

    fn is_open(&self) -> bool;

    fn is_running(&self) -> bool;

    fn open(&mut self, sample_rate: f64, frames_per_buffer: usize) -> Result<()>;

    /// Start streaming, opening first if needed.
    fn start(&mut self, sample_rate: f64, frames_per_buffer: usize, slot: &mut ProcessorSlot) -> Result<()>;

    /// Stop streaming. On success the processor is back in `slot`.
    fn stop(&mut self, slot: &mut ProcessorSlot) -> Result<()>;

    /// Close the stream, stopping first if it is running.
    fn close(&mut self, slot: &mut ProcessorSlot) -> Result<()>;

    /// Request `count` device channels for one direction.
    ///
    /// `-1` asks for every channel the device has. Implementations clamp to
    /// the device maximum and ignore the request while open.
    fn configure_channels(&mut self, count: i32, direction: Direction);

    /// Channel count currently granted by the device.
    fn device_channels(&self, direction: Direction) -> usize;

    fn device(&self, direction: Direction) -> DeviceInfo;

    fn supports_sample_rate(&self, sample_rate: f64) -> bool;

    /// Fraction of the block period spent in the callback (advisory).
    fn cpu_load(&self) -> f64;
}

/// Resolve a channel request against a device maximum.
///
/// `-1` maps to the maximum; anything else is clamped into `[0, max]`.
pub(crate) fn resolve_channel_request(count: i32, max: usize) -> usize {
    if count < 0 {
        max
    } else {
        (count as usize).min(max)
    }
}
