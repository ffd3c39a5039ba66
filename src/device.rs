//! Static capability records for audio endpoints.

/// What an audio endpoint can do. Queried by backends, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub id: usize,
    pub name: String,
    pub max_input_channels: usize,
    pub max_output_channels: usize,
    pub default_sample_rate: f64,
}

impl DeviceInfo {
    pub fn new(
        id: usize,
        name: impl Into<String>,
        max_input_channels: usize,
        max_output_channels: usize,
        default_sample_rate: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            max_input_channels,
            max_output_channels,
            default_sample_rate,
        }
    }

    /// Placeholder for a direction with no usable device.
    pub fn none() -> Self {
        Self::new(0, "none", 0, 0, 0.0)
    }

    pub fn has_input(&self) -> bool {
        self.max_input_channels > 0
    }

    pub fn has_output(&self) -> bool {
        self.max_output_channels > 0
    }

    /// Channel capacity for one direction.
    pub fn max_channels(&self, direction: crate::backend::Direction) -> usize {
        match direction {
            crate::backend::Direction::Input => self.max_input_channels,
            crate::backend::Direction::Output => self.max_output_channels,
        }
    }
}
