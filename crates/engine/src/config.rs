use serde::{Deserialize, Serialize};

use crate::effects::{DEFAULT_HIGH_PASS_HZ, DEFAULT_LOW_PASS_HZ};

/// Stream and plumbing settings for one engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Preferred frames per hardware callback.
    pub block_frames: u32,
    /// Preferred device sample rate; sounds are resampled to the rate the
    /// stream actually runs at.
    pub sample_rate: u32,
    pub command_capacity: usize,
    pub status_capacity: usize,
    pub filter_low_hz: f32,
    pub filter_high_hz: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_frames: 128,
            sample_rate: scrub_transport::ENGINE_SAMPLE_RATE,
            command_capacity: 256,
            status_capacity: 256,
            filter_low_hz: DEFAULT_HIGH_PASS_HZ,
            filter_high_hz: DEFAULT_LOW_PASS_HZ,
        }
    }
}
