//! Parametric equalizer with up to eight bands.
//!
//! Every band filters the equalizer's input independently and adds its
//! difference to the output. Shelf, bell and notch bands contribute
//! `filtered - input`; pass bands contribute `gain · filtered - input`.
//!
//! The older three-knob layout (`low`, `mid`, `high` in dB) is still accepted
//! and converted to a low shelf, a bell and a high shelf.

use serde::Deserialize;

use crate::dsp::filter::{Biquad, BiquadCoefficients, FilterType};
use crate::settings::{Settings, clamp_or};
use super::db_to_linear;

pub const MAX_BANDS: usize = 8;

const LEGACY_LOW_HZ: f64 = 250.0;
const LEGACY_MID_HZ: f64 = 1000.0;
const LEGACY_MID_Q: f64 = 0.7;
const LEGACY_HIGH_HZ: f64 = 4000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandType {
    #[default]
    #[serde(alias = "peaking")]
    Bell,
    Notch,
    #[serde(alias = "low-shelf")]
    Lowshelf,
    #[serde(alias = "high-shelf")]
    Highshelf,
    Lowpass,
    Highpass,
    Bandpass,
}

impl From<BandType> for FilterType {
    fn from(b: BandType) -> Self {
        match b {
            BandType::Bell => FilterType::Bell,
            BandType::Notch => FilterType::Notch,
            BandType::Lowshelf => FilterType::LowShelf,
            BandType::Highshelf => FilterType::HighShelf,
            BandType::Lowpass => FilterType::Lowpass,
            BandType::Highpass => FilterType::Highpass,
            BandType::Bandpass => FilterType::Bandpass,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EqBand {
    #[serde(rename = "type")]
    pub band_type: BandType,
    /// Centre or corner frequency in Hz [20, 20000]. Default 1000.
    pub frequency: f64,
    /// Gain in dB [-24, 24]. Default 0.
    pub gain: f64,
    /// Q [0.1, 18]. Default 0.707.
    pub q: f64,
    pub enabled: bool,
}

impl Default for EqBand {
    fn default() -> Self {
        EqBand {
            band_type: BandType::Bell,
            frequency: 1000.0,
            gain: 0.0,
            q: std::f64::consts::FRAC_1_SQRT_2,
            enabled: true,
        }
    }
}

impl EqBand {
    fn validated(self) -> Self {
        let d = EqBand::default();
        EqBand {
            band_type: self.band_type,
            frequency: clamp_or(self.frequency, 20.0, 20000.0, d.frequency),
            gain: clamp_or(self.gain, -24.0, 24.0, d.gain),
            q: clamp_or(self.q, 0.1, 18.0, d.q),
            enabled: self.enabled,
        }
    }
}

/// Accepted wire layouts.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EqualizerWire {
    bands: Option<Vec<EqBand>>,
    low: Option<f64>,
    mid: Option<f64>,
    high: Option<f64>,
}

impl From<EqualizerWire> for EqualizerSettings {
    fn from(wire: EqualizerWire) -> Self {
        if let Some(bands) = wire.bands {
            return EqualizerSettings { bands };
        }
        let legacy = [
            (wire.low, BandType::Lowshelf, LEGACY_LOW_HZ, std::f64::consts::FRAC_1_SQRT_2),
            (wire.mid, BandType::Bell, LEGACY_MID_HZ, LEGACY_MID_Q),
            (wire.high, BandType::Highshelf, LEGACY_HIGH_HZ, std::f64::consts::FRAC_1_SQRT_2),
        ];
        let bands = legacy
            .into_iter()
            .filter_map(|(gain, band_type, frequency, q)| {
                gain.map(|gain| EqBand {
                    band_type,
                    frequency,
                    gain,
                    q,
                    enabled: true,
                })
            })
            .collect();
        EqualizerSettings { bands }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "EqualizerWire")]
pub struct EqualizerSettings {
    pub bands: Vec<EqBand>,
}

impl Settings for EqualizerSettings {
    fn validated(self) -> Self {
        EqualizerSettings {
            bands: self
                .bands
                .into_iter()
                .take(MAX_BANDS)
                .map(EqBand::validated)
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EqualizerState {
    sample_rate: f64,
    filters: [Biquad; MAX_BANDS],
    /// Band each filter was designed for.
    designed: [Option<EqBand>; MAX_BANDS],
}

impl EqualizerState {
    pub fn new(sample_rate: f64) -> Self {
        EqualizerState {
            sample_rate,
            filters: std::array::from_fn(|_| Biquad::default()),
            designed: [None; MAX_BANDS],
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64, settings: &EqualizerSettings) -> f64 {
        let mut output = input;
        for (i, band) in settings.bands.iter().take(MAX_BANDS).enumerate() {
            if !band.enabled {
                continue;
            }
            if self.designed[i] != Some(*band) {
                let kind: FilterType = band.band_type.into();
                self.filters[i].set_coefficients(BiquadCoefficients::design(
                    kind,
                    band.frequency,
                    band.q,
                    band.gain,
                    self.sample_rate,
                ));
                self.designed[i] = Some(*band);
            }
            let filtered = self.filters[i].process(input);
            if FilterType::from(band.band_type).is_pass() {
                output += db_to_linear(band.gain) * filtered - input;
            } else {
                output += filtered - input;
            }
        }
        output
    }
}
