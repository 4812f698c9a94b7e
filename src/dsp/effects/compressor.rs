//! Compressor effect: peak-detecting feed-forward compressor.
//!
//! The gain computer works on the instantaneous peak. Attack and release
//! smooth the computed gain, not the signal.

use serde::Deserialize;

use super::{db_to_linear, linear_to_db};
use crate::settings::{Settings, clamp_or};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompressorSettings {
    /// Threshold in dB [-60, 0]. Default -24.
    pub threshold: f64,
    /// Ratio [1, 20]. Default 4.
    pub ratio: f64,
    /// Attack time in seconds [0.0001, 1]. Default 0.003.
    pub attack: f64,
    /// Release time in seconds [0.001, 5]. Default 0.25.
    pub release: f64,
    /// Makeup gain in dB [0, 24]. Default 0.
    pub makeup_gain: f64,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        CompressorSettings {
            threshold: -24.0,
            ratio: 4.0,
            attack: 0.003,
            release: 0.25,
            makeup_gain: 0.0,
        }
    }
}

impl Settings for CompressorSettings {
    fn validated(self) -> Self {
        let d = CompressorSettings::default();
        CompressorSettings {
            threshold: clamp_or(self.threshold, -60.0, 0.0, d.threshold),
            ratio: clamp_or(self.ratio, 1.0, 20.0, d.ratio),
            attack: clamp_or(self.attack, 0.0001, 1.0, d.attack),
            release: clamp_or(self.release, 0.001, 5.0, d.release),
            makeup_gain: clamp_or(self.makeup_gain, 0.0, 24.0, d.makeup_gain),
        }
    }
}

/// Gain change in dB for a peak at `input_db` (hard knee, never positive).
#[inline]
pub fn gain_reduction_db(input_db: f64, threshold: f64, ratio: f64) -> f64 {
    if input_db <= threshold {
        0.0
    } else {
        (threshold - input_db) * (1.0 - 1.0 / ratio)
    }
}

#[derive(Debug, Clone)]
pub struct CompressorState {
    sample_rate: f64,
    /// Smoothed linear gain applied to the signal.
    gain: f64,
    attack_coeff: f64,
    release_coeff: f64,
    makeup: f64,
    /// (attack, release, makeup dB) the coefficients were computed for.
    tuned_for: Option<(f64, f64, f64)>,
}

impl CompressorState {
    pub fn new(sample_rate: f64) -> Self {
        CompressorState {
            sample_rate,
            gain: 1.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            makeup: 1.0,
            tuned_for: None,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64, settings: &CompressorSettings) -> f64 {
        let key = (settings.attack, settings.release, settings.makeup_gain);
        if self.tuned_for != Some(key) {
            self.attack_coeff = (-1.0 / (settings.attack * self.sample_rate)).exp();
            self.release_coeff = (-1.0 / (settings.release * self.sample_rate)).exp();
            self.makeup = db_to_linear(settings.makeup_gain);
            self.tuned_for = Some(key);
        }

        let reduction = gain_reduction_db(linear_to_db(input.abs()), settings.threshold, settings.ratio);
        let target = db_to_linear(reduction);

        // Falling gain is the attack; recovering gain is the release.
        let coeff = if target < self.gain {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.gain = target + coeff * (self.gain - target);

        input * self.gain * self.makeup
    }
}
