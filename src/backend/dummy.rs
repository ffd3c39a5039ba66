use log::debug;

use super::{resolve_channel_request, Backend, BackendKind, Direction, ProcessorSlot};
use crate::device::DeviceInfo;
use crate::Result;

/// Channel capacity advertised by the no-op device in each direction.
pub const DUMMY_MAX_CHANNELS: usize = 64;

/// Backend that never touches hardware.
///
/// Every operation succeeds. No callback thread exists, so the processor
/// stays with the engine and blocks are driven by hand via
/// [`AudioIo::process_audio`](crate::io::AudioIo::process_audio) or
/// [`AudioIo::process_block`](crate::io::AudioIo::process_block).
#[derive(Debug)]
pub struct DummyBackend {
    in_channels: usize,
    out_channels: usize,
    open: bool,
    running: bool,
}

impl DummyBackend {
    pub fn new() -> Self {
        Self {
            in_channels: DUMMY_MAX_CHANNELS,
            out_channels: DUMMY_MAX_CHANNELS,
            open: false,
            running: false,
        }
    }

    fn info() -> DeviceInfo {
        DeviceInfo::new(0, "dummy", DUMMY_MAX_CHANNELS, DUMMY_MAX_CHANNELS, 44_100.0)
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for DummyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dummy
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn open(&mut self, sample_rate: f64, frames_per_buffer: usize) -> Result<()> {
        debug!("dummy backend open: {sample_rate} Hz, {frames_per_buffer} frames");
        self.open = true;
        Ok(())
    }

    fn start(&mut self, sample_rate: f64, frames_per_buffer: usize, _slot: &mut ProcessorSlot) -> Result<()> {
        if !self.open {
            self.open(sample_rate, frames_per_buffer)?;
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self, _slot: &mut ProcessorSlot) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn close(&mut self, _slot: &mut ProcessorSlot) -> Result<()> {
        self.running = false;
        self.open = false;
        Ok(())
    }

    fn configure_channels(&mut self, count: i32, direction: Direction) {
        let count = resolve_channel_request(count, DUMMY_MAX_CHANNELS);
        match direction {
            Direction::Input => self.in_channels = count,
            Direction::Output => self.out_channels = count,
        }
    }

    fn device_channels(&self, direction: Direction) -> usize {
        match direction {
            Direction::Input => self.in_channels,
            Direction::Output => self.out_channels,
        }
    }

    fn device(&self, _direction: Direction) -> DeviceInfo {
        Self::info()
    }

    fn supports_sample_rate(&self, _sample_rate: f64) -> bool {
        true
    }

    fn cpu_load(&self) -> f64 {
        0.0
    }
}
