//! Error types for the I/O engine and its backends.

use thiserror::Error;

/// Error type for engine and backend operations.
///
/// Nothing here is ever raised from inside the audio callback; callback-side
/// anomalies (non-finite samples, missing routing channels) are handled in
/// place.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// The operation is only defined while the stream is stopped or closed.
    #[error("Cannot {operation} while the stream is {state}")]
    StreamActive {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Audio device not available")]
    DeviceUnavailable,

    #[error("Sample rate {0} Hz is not supported by the device")]
    UnsupportedSampleRate(f64),

    #[cfg(feature = "hardware")]
    #[error("Failed to fetch default stream config")]
    DefaultStreamConfig(#[from] cpal::DefaultStreamConfigError),

    #[cfg(feature = "hardware")]
    #[error("Failed to query supported stream configs")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[cfg(feature = "hardware")]
    #[error("Failed to build audio stream")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[cfg(feature = "hardware")]
    #[error("Failed to play audio stream")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[cfg(feature = "hardware")]
    #[error("Failed to pause audio stream")]
    PauseStream(#[from] cpal::PauseStreamError),

    #[cfg(feature = "hardware")]
    #[error("Failed to get device name")]
    DeviceName(#[from] cpal::DeviceNameError),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
