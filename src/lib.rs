pub mod backend; // Device-facing stream lifecycle
pub mod config;
pub mod decorrelation; // Random-phase filter bank
pub mod device;
pub mod dsp;
pub mod error;
pub mod io; // Block engine, buffers and stage chain

pub use backend::{Backend, BackendKind, Direction};
pub use config::{IoConfig, ALL_CHANNELS};
pub use decorrelation::Decorrelation;
pub use device::DeviceInfo;
pub use error::{Error, Result};
pub use io::{AudioBuffers, AudioIo, AudioStage, Controls, StageId};

pub const MAX_BLOCK_SIZE: usize = 4096;
