//! Filter effect: one resonant biquad with normalized controls.

use serde::Deserialize;

use crate::dsp::filter::{Biquad, BiquadCoefficients, FilterType};
use crate::settings::{Settings, clamp_or};

/// Pass types the filter effect offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassType {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
}

impl From<PassType> for FilterType {
    fn from(p: PassType) -> Self {
        match p {
            PassType::Lowpass => FilterType::Lowpass,
            PassType::Highpass => FilterType::Highpass,
            PassType::Bandpass => FilterType::Bandpass,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterSettings {
    #[serde(rename = "type", alias = "filterType")]
    pub filter_type: PassType,
    /// Normalized cutoff [0, 1], mapped log-linearly to 20 Hz – 20 kHz. Default 0.5.
    pub cutoff: f64,
    /// Normalized resonance [0, 1], mapped to Q 0.5 – 10. Default 0.
    pub resonance: f64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        FilterSettings {
            filter_type: PassType::Lowpass,
            cutoff: 0.5,
            resonance: 0.0,
        }
    }
}

impl Settings for FilterSettings {
    fn validated(self) -> Self {
        let d = FilterSettings::default();
        FilterSettings {
            filter_type: self.filter_type,
            cutoff: clamp_or(self.cutoff, 0.0, 1.0, d.cutoff),
            resonance: clamp_or(self.resonance, 0.0, 1.0, d.resonance),
        }
    }
}

/// Normalized cutoff to Hz: 0 → 20 Hz, 1 → 20 kHz, log-linear in between.
#[inline]
pub fn cutoff_to_hz(normalized: f64) -> f64 {
    20.0 * 1000.0_f64.powf(normalized)
}

/// Normalized resonance to Q: 0 → 0.5, 1 → 10.
#[inline]
pub fn resonance_to_q(normalized: f64) -> f64 {
    0.5 + normalized * 9.5
}

#[derive(Debug, Clone)]
pub struct FilterState {
    sample_rate: f64,
    biquad: Biquad,
    designed_for: Option<FilterSettings>,
}

impl FilterState {
    pub fn new(sample_rate: f64) -> Self {
        FilterState {
            sample_rate,
            biquad: Biquad::default(),
            designed_for: None,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64, settings: &FilterSettings) -> f64 {
        if self.designed_for.as_ref() != Some(settings) {
            self.biquad.set_coefficients(BiquadCoefficients::design(
                settings.filter_type.into(),
                cutoff_to_hz(settings.cutoff),
                resonance_to_q(settings.resonance),
                0.0,
                self.sample_rate,
            ));
            self.designed_for = Some(settings.clone());
        }
        self.biquad.process(input)
    }
}
