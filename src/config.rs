//! Engine-wide configuration.

use serde::{Deserialize, Serialize};

use crate::settings::clamp_or;

/// Operating sample rate assumed when the host does not supply one.
pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

/// Makeup gain applied by wavetable voices after velocity scaling.
///
/// Empirically tuned; overridable per engine and per track.
pub const WAVETABLE_MAKEUP_GAIN: f64 = 1.5;

/// Configuration for one engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Operating sample rate in Hz.
    pub sample_rate: f64,
    /// How far ahead of the playhead events are converted to sample time.
    pub lookahead_seconds: f64,
    /// Minimum spacing between playback position updates.
    pub position_update_interval_seconds: f64,
    /// Linear gain applied to the stereo bus before soft clipping.
    pub master_gain: f64,
    /// Capacity of the control command queue.
    pub queue_capacity: usize,
    /// Capacity of the position update queue.
    pub position_queue_capacity: usize,
    /// Default makeup gain for wavetable voices.
    pub wavetable_makeup_gain: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: DEFAULT_SAMPLE_RATE,
            lookahead_seconds: 0.15,
            position_update_interval_seconds: 1.0 / 30.0,
            master_gain: 0.8,
            queue_capacity: 1024,
            position_queue_capacity: 64,
            wavetable_makeup_gain: WAVETABLE_MAKEUP_GAIN,
        }
    }
}

impl EngineConfig {
    pub fn with_sample_rate(sample_rate: f64) -> Self {
        EngineConfig {
            sample_rate,
            ..Default::default()
        }
        .validated()
    }

    /// Clamp every field into a usable range.
    pub fn validated(self) -> Self {
        let d = EngineConfig::default();
        EngineConfig {
            sample_rate: clamp_or(self.sample_rate, 8000.0, 192000.0, d.sample_rate),
            lookahead_seconds: clamp_or(self.lookahead_seconds, 0.01, 2.0, d.lookahead_seconds),
            position_update_interval_seconds: clamp_or(
                self.position_update_interval_seconds,
                0.001,
                1.0,
                d.position_update_interval_seconds,
            ),
            master_gain: clamp_or(self.master_gain, 0.0, 4.0, d.master_gain),
            queue_capacity: self.queue_capacity.max(1),
            position_queue_capacity: self.position_queue_capacity.max(1),
            wavetable_makeup_gain: clamp_or(
                self.wavetable_makeup_gain,
                0.0,
                8.0,
                d.wavetable_makeup_gain,
            ),
        }
    }

    /// Position update interval in whole samples (at least one).
    pub fn position_interval_samples(&self) -> u64 {
        ((self.position_update_interval_seconds * self.sample_rate).round() as u64).max(1)
    }
}
