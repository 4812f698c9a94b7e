//! Hi-hat: highpassed noise, optionally coloured by a resonant bandpass.

use serde::Deserialize;

use super::{envelope_gain, pitch_ratio, validated_shape};
use crate::dsp::envelope::{Envelope, EnvelopeShape};
use crate::dsp::filter::{Biquad, BiquadCoefficients, FilterType};
use crate::dsp::oscillator::Noise;
use crate::settings::{Settings, clamp_or};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HiHatSettings {
    /// Seconds [0, 5], default 0.001.
    pub attack: f64,
    /// Seconds [0, 10], default 0.03.
    pub decay: f64,
    /// Level [0, 1], default 0.2.
    pub sustain: f64,
    /// Seconds [0, 10], default 0.05. Longer values give an open hat.
    pub release: f64,
    /// Highpass cutoff in Hz [1000, 18000], default 7000.
    pub cutoff: f64,
    /// Bandpass colour amount [0, 1], default 0.
    pub color: f64,
    /// Bandpass centre in Hz [2000, 18000], default 10000.
    pub color_frequency: f64,
    /// Output gain [0, 2], default 0.8.
    pub gain: f64,
}

impl Default for HiHatSettings {
    fn default() -> Self {
        HiHatSettings {
            attack: 0.001,
            decay: 0.03,
            sustain: 0.2,
            release: 0.05,
            cutoff: 7000.0,
            color: 0.0,
            color_frequency: 10000.0,
            gain: 0.8,
        }
    }
}

impl HiHatSettings {
    pub fn shape(&self) -> EnvelopeShape {
        EnvelopeShape {
            attack: self.attack,
            decay: self.decay,
            sustain: self.sustain,
            release: self.release,
        }
    }
}

impl Settings for HiHatSettings {
    fn validated(self) -> Self {
        let d = HiHatSettings::default();
        let shape = validated_shape(self.shape(), d.shape());
        HiHatSettings {
            attack: shape.attack,
            decay: shape.decay,
            sustain: shape.sustain,
            release: shape.release,
            cutoff: clamp_or(self.cutoff, 1000.0, 18000.0, d.cutoff),
            color: clamp_or(self.color, 0.0, 1.0, d.color),
            color_frequency: clamp_or(self.color_frequency, 2000.0, 18000.0, d.color_frequency),
            gain: clamp_or(self.gain, 0.0, 2.0, d.gain),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HiHatVoice {
    settings: HiHatSettings,
    envelope: Envelope,
    noise: Noise,
    highpass: Biquad,
    bandpass: Biquad,
    sample_rate: f64,
    /// Pitch the filters were last designed for.
    designed_ratio: f64,
    velocity: f64,
}

impl HiHatVoice {
    pub fn new(settings: &HiHatSettings, sample_rate: f64, seed: u64) -> Self {
        let mut voice = HiHatVoice {
            settings: settings.clone(),
            envelope: Envelope::new(settings.shape(), sample_rate),
            noise: Noise::new(seed),
            highpass: Biquad::default(),
            bandpass: Biquad::default(),
            sample_rate,
            designed_ratio: 1.0,
            velocity: 0.0,
        };
        voice.update_settings(settings);
        voice
    }

    pub fn update_settings(&mut self, settings: &HiHatSettings) {
        self.settings = settings.clone();
        self.envelope.set_shape(settings.shape());
        self.design(self.designed_ratio);
    }

    fn design(&mut self, ratio: f64) {
        let s = &self.settings;
        self.highpass.set_coefficients(BiquadCoefficients::design(
            FilterType::Highpass,
            s.cutoff * ratio,
            std::f64::consts::FRAC_1_SQRT_2,
            0.0,
            self.sample_rate,
        ));
        self.bandpass.set_coefficients(BiquadCoefficients::design(
            FilterType::Bandpass,
            s.color_frequency * ratio,
            1.5,
            0.0,
            self.sample_rate,
        ));
        self.designed_ratio = ratio;
    }

    pub fn trigger(&mut self, velocity: f64, pitch: u8) {
        self.velocity = velocity;
        let ratio = pitch_ratio(pitch);
        if ratio != self.designed_ratio {
            self.design(ratio);
        }
        self.highpass.reset();
        self.bandpass.reset();
        self.envelope.trigger();
    }

    pub fn next_sample(&mut self) -> f64 {
        let Some(env) = envelope_gain(self.envelope.next_level()) else {
            return 0.0;
        };
        let s = &self.settings;
        let hp = self.highpass.process(self.noise.next_sample());
        let out = if s.color > 0.0 {
            let bp = self.bandpass.process(hp);
            hp * (1.0 - s.color) + bp * s.color * 2.0
        } else {
            hp
        };
        out * env * self.velocity * s.gain
    }

    pub fn is_active(&self) -> bool {
        self.envelope.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longer_release_rings_longer() {
        let closed = HiHatSettings::default();
        let open = HiHatSettings {
            release: 0.4,
            ..Default::default()
        };
        let run = |settings: &HiHatSettings| {
            let mut voice = HiHatVoice::new(settings, 44100.0, 9);
            voice.trigger(1.0, 60);
            let mut n = 0;
            while voice.is_active() {
                voice.next_sample();
                n += 1;
            }
            n
        };
        assert!(run(&open) > run(&closed));
    }

    #[test]
    fn pitch_redesigns_filters() {
        let mut voice = HiHatVoice::new(&HiHatSettings::default(), 44100.0, 0);
        let before = voice.highpass.coefficients();
        voice.trigger(1.0, 48);
        assert_ne!(voice.highpass.coefficients(), before);
    }
}
