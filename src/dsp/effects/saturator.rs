//! Saturator: shelf tone shaping in front of the drive stage.

use serde::Deserialize;

use super::drive_stage;
use crate::dsp::filter::{Biquad, BiquadCoefficients, FilterType};
use crate::settings::{Settings, clamp_or};

const HIGH_SHELF_HZ: f64 = 3000.0;
const LOW_SHELF_HZ: f64 = 250.0;
/// Shelf gain at either end of the tone control.
const MAX_SHELF_DB: f64 = 12.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SaturatorSettings {
    /// Normalized drive [0, 1]. Default 0.3.
    pub drive: f64,
    /// Tone [0, 1]: above 0.5 lifts highs, below 0.5 lifts lows. Default 0.5.
    pub tone: f64,
    /// Dry/wet mix [0, 1]. Default 0.5.
    pub mix: f64,
}

impl Default for SaturatorSettings {
    fn default() -> Self {
        SaturatorSettings {
            drive: 0.3,
            tone: 0.5,
            mix: 0.5,
        }
    }
}

impl Settings for SaturatorSettings {
    fn validated(self) -> Self {
        let d = SaturatorSettings::default();
        SaturatorSettings {
            drive: clamp_or(self.drive, 0.0, 1.0, d.drive),
            tone: clamp_or(self.tone, 0.0, 1.0, d.tone),
            mix: clamp_or(self.mix, 0.0, 1.0, d.mix),
        }
    }
}

/// Shelf type and gain for a tone setting; `None` at the neutral centre.
pub fn tone_shelf(tone: f64) -> Option<(FilterType, f64, f64)> {
    let offset = tone - 0.5;
    if offset > 0.0 {
        Some((FilterType::HighShelf, HIGH_SHELF_HZ, offset * 2.0 * MAX_SHELF_DB))
    } else if offset < 0.0 {
        Some((FilterType::LowShelf, LOW_SHELF_HZ, -offset * 2.0 * MAX_SHELF_DB))
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct SaturatorState {
    sample_rate: f64,
    shelf: Option<Biquad>,
    tuned_tone: Option<f64>,
}

impl SaturatorState {
    pub fn new(sample_rate: f64) -> Self {
        SaturatorState {
            sample_rate,
            shelf: None,
            tuned_tone: None,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64, settings: &SaturatorSettings) -> f64 {
        if self.tuned_tone != Some(settings.tone) {
            self.shelf = tone_shelf(settings.tone).map(|(kind, freq, gain_db)| {
                let coeffs = BiquadCoefficients::design(
                    kind,
                    freq,
                    std::f64::consts::FRAC_1_SQRT_2,
                    gain_db,
                    self.sample_rate,
                );
                // Keep history across tone sweeps that stay on one side.
                match self.shelf.take() {
                    Some(mut bq) => {
                        bq.set_coefficients(coeffs);
                        bq
                    }
                    None => Biquad::new(coeffs),
                }
            });
            self.tuned_tone = Some(settings.tone);
        }

        let shaped = match &mut self.shelf {
            Some(bq) => bq.process(input),
            None => input,
        };
        let wet = drive_stage(shaped, settings.drive);
        input * (1.0 - settings.mix) + wet * settings.mix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_selects_shelf() {
        assert_eq!(tone_shelf(0.5), None);
        assert_eq!(tone_shelf(1.0), Some((FilterType::HighShelf, HIGH_SHELF_HZ, 12.0)));
        assert_eq!(tone_shelf(0.0), Some((FilterType::LowShelf, LOW_SHELF_HZ, 12.0)));
    }

    #[test]
    fn neutral_tone_matches_plain_drive() {
        let mut st = SaturatorState::new(44100.0);
        let s = SaturatorSettings {
            mix: 1.0,
            ..Default::default()
        };
        for x in [-0.5, 0.0, 0.1, 0.7] {
            assert_eq!(st.process(x, &s), drive_stage(x, s.drive));
        }
        assert!(st.shelf.is_none());
    }

    #[test]
    fn dry_mix_ignores_drive() {
        let mut st = SaturatorState::new(44100.0);
        let s = SaturatorSettings {
            drive: 1.0,
            tone: 0.9,
            mix: 0.0,
        };
        assert_eq!(st.process(0.4, &s), 0.4);
        assert!(st.shelf.is_some());
    }
}
