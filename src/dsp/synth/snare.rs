//! Snare drum: a short sine body under highpassed noise.

use std::f64::consts::PI;

use serde::Deserialize;

use super::{envelope_gain, pitch_ratio, validated_shape};
use crate::dsp::envelope::{Envelope, EnvelopeShape};
use crate::dsp::filter::{Biquad, BiquadCoefficients, FilterType};
use crate::dsp::oscillator::Noise;
use crate::settings::{Settings, clamp_or};

/// Time constant of the tonal body, in seconds.
const BODY_TIME: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SnareSettings {
    /// Seconds [0, 5], default 0.001.
    pub attack: f64,
    /// Seconds [0, 10], default 0.06.
    pub decay: f64,
    /// Level [0, 1], default 0.3.
    pub sustain: f64,
    /// Seconds [0, 10], default 0.15.
    pub release: f64,
    /// Body frequency in Hz [50, 1000], default 185.
    pub tone_frequency: f64,
    /// Share of the body in the mix [0, 1], default 0.4.
    pub tone_mix: f64,
    /// Noise highpass cutoff in Hz [100, 12000], default 1500.
    pub noise_cutoff: f64,
    /// Output gain [0, 2], default 1.
    pub gain: f64,
}

impl Default for SnareSettings {
    fn default() -> Self {
        SnareSettings {
            attack: 0.001,
            decay: 0.06,
            sustain: 0.3,
            release: 0.15,
            tone_frequency: 185.0,
            tone_mix: 0.4,
            noise_cutoff: 1500.0,
            gain: 1.0,
        }
    }
}

impl SnareSettings {
    pub fn shape(&self) -> EnvelopeShape {
        EnvelopeShape {
            attack: self.attack,
            decay: self.decay,
            sustain: self.sustain,
            release: self.release,
        }
    }
}

impl Settings for SnareSettings {
    fn validated(self) -> Self {
        let d = SnareSettings::default();
        let shape = validated_shape(self.shape(), d.shape());
        SnareSettings {
            attack: shape.attack,
            decay: shape.decay,
            sustain: shape.sustain,
            release: shape.release,
            tone_frequency: clamp_or(self.tone_frequency, 50.0, 1000.0, d.tone_frequency),
            tone_mix: clamp_or(self.tone_mix, 0.0, 1.0, d.tone_mix),
            noise_cutoff: clamp_or(self.noise_cutoff, 100.0, 12000.0, d.noise_cutoff),
            gain: clamp_or(self.gain, 0.0, 2.0, d.gain),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnareVoice {
    settings: SnareSettings,
    envelope: Envelope,
    noise: Noise,
    highpass: Biquad,
    sample_rate: f64,
    phase: f64,
    body_coeff: f64,
    body_level: f64,
    ratio: f64,
    velocity: f64,
}

impl SnareVoice {
    pub fn new(settings: &SnareSettings, sample_rate: f64, seed: u64) -> Self {
        let mut voice = SnareVoice {
            settings: settings.clone(),
            envelope: Envelope::new(settings.shape(), sample_rate),
            noise: Noise::new(seed),
            highpass: Biquad::default(),
            sample_rate,
            phase: 0.0,
            body_coeff: (-1.0 / (BODY_TIME * sample_rate)).exp(),
            body_level: 0.0,
            ratio: 1.0,
            velocity: 0.0,
        };
        voice.update_settings(settings);
        voice
    }

    pub fn update_settings(&mut self, settings: &SnareSettings) {
        self.settings = settings.clone();
        self.envelope.set_shape(settings.shape());
        self.highpass.set_coefficients(BiquadCoefficients::design(
            FilterType::Highpass,
            settings.noise_cutoff,
            std::f64::consts::FRAC_1_SQRT_2,
            0.0,
            self.sample_rate,
        ));
    }

    pub fn trigger(&mut self, velocity: f64, pitch: u8) {
        self.velocity = velocity;
        self.ratio = pitch_ratio(pitch);
        self.phase = 0.0;
        self.body_level = 1.0;
        self.highpass.reset();
        self.envelope.trigger();
    }

    pub fn next_sample(&mut self) -> f64 {
        let Some(env) = envelope_gain(self.envelope.next_level()) else {
            return 0.0;
        };
        let s = &self.settings;

        let body = (2.0 * PI * self.phase).sin() * self.body_level;
        self.body_level *= self.body_coeff;
        self.phase += s.tone_frequency * self.ratio / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }

        let noise = self.highpass.process(self.noise.next_sample());
        let mixed = body * s.tone_mix + noise * (1.0 - s.tone_mix);
        mixed * env * self.velocity * s.gain
    }

    pub fn is_active(&self) -> bool {
        self.envelope.is_running()
    }
}
