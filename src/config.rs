//! Stream configuration for [`AudioIo`](crate::io::AudioIo).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;
use crate::{Error, Result, MAX_BLOCK_SIZE};

/// Request every channel the device offers.
pub const ALL_CHANNELS: i32 = -1;

/// Everything needed to bring up an audio session.
///
/// Channel requests for input and output are forwarded to the backend, which
/// clamps them to what the device offers. `ALL_CHANNELS` (-1) opens every
/// device channel. Bus channels are internal and never touch the device.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct IoConfig {
    /// Frames processed per callback block.
    pub frames_per_buffer: usize,
    /// Stream sample rate in Hz.
    pub sample_rate: f64,
    pub channels_out: i32,
    pub channels_in: i32,
    pub channels_bus: usize,
    pub backend: BackendKind,
    /// Clear output buffers before the chain runs each block.
    pub auto_zero_out: bool,
    /// Replace non-finite output samples with silence.
    pub zero_nans: bool,
    /// Hard-clip output samples to [-1, 1].
    pub clip_out: bool,
    /// Apply the ramped master gain after the chain.
    pub use_gain: bool,
    /// Initial master gain (only used when `use_gain` is set).
    pub gain: f32,
}

impl IoConfig {
    /// A configuration on the no-op backend, for tests and offline driving.
    pub fn dummy(frames_per_buffer: usize, sample_rate: f64, channels_out: i32, channels_in: i32) -> Self {
        Self {
            frames_per_buffer,
            sample_rate,
            channels_out,
            channels_in,
            backend: BackendKind::Dummy,
            ..Self::default()
        }
    }

    pub fn frames_per_buffer(mut self, frames: usize) -> Self {
        self.frames_per_buffer = frames;
        self
    }

    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn channels(mut self, channels_out: i32, channels_in: i32) -> Self {
        self.channels_out = channels_out;
        self.channels_in = channels_in;
        self
    }

    pub fn bus_channels(mut self, channels: usize) -> Self {
        self.channels_bus = channels;
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.frames_per_buffer == 0 {
            return Err(Error::InvalidConfig("frames per buffer must be positive".into()));
        }
        if self.frames_per_buffer > MAX_BLOCK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "frames per buffer {} exceeds maximum block size {}",
                self.frames_per_buffer, MAX_BLOCK_SIZE
            )));
        }
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if self.channels_out < ALL_CHANNELS || self.channels_in < ALL_CHANNELS {
            return Err(Error::InvalidConfig(format!(
                "unsupported channel request: out={} in={}",
                self.channels_out, self.channels_in
            )));
        }
        if !self.gain.is_finite() {
            return Err(Error::InvalidConfig("gain must be finite".into()));
        }
        Ok(())
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            frames_per_buffer: 512,
            sample_rate: 44_100.0,
            channels_out: 2,
            channels_in: 0,
            channels_bus: 0,
            backend: BackendKind::default(),
            auto_zero_out: true,
            zero_nans: true,
            clip_out: true,
            use_gain: false,
            gain: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(IoConfig::default().validate().is_ok());
    }

    #[test]
    fn test_safety_flags_default_on() {
        let config = IoConfig::default();
        assert!(config.auto_zero_out);
        assert!(config.zero_nans);
        assert!(config.clip_out);
        assert!(!config.use_gain);
    }

    #[test]
    fn test_rejects_zero_frames() {
        let config = IoConfig::default().frames_per_buffer(0);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_oversized_block() {
        let config = IoConfig::default().frames_per_buffer(MAX_BLOCK_SIZE + 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_sample_rate() {
        assert!(IoConfig::default().sample_rate(0.0).validate().is_err());
        assert!(IoConfig::default().sample_rate(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_all_channels_request_is_valid() {
        let config = IoConfig::default().channels(ALL_CHANNELS, ALL_CHANNELS);
        assert!(config.validate().is_ok());

        let config = IoConfig::default().channels(-2, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dummy_constructor() {
        let config = IoConfig::dummy(64, 48_000.0, 2, 2);
        assert_eq!(config.backend, BackendKind::Dummy);
        assert_eq!(config.frames_per_buffer, 64);
        assert_eq!(config.channels_in, 2);
    }
}
