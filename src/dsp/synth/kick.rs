//! Kick drum: a sine whose pitch sweeps down exponentially, plus a noise click.

use std::f64::consts::PI;

use serde::Deserialize;

use super::{envelope_gain, pitch_ratio, validated_shape};
use crate::dsp::envelope::{Envelope, EnvelopeShape};
use crate::dsp::oscillator::Noise;
use crate::settings::{Settings, clamp_or};

/// Time constant of the click transient, in seconds.
const CLICK_TIME: f64 = 0.002;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KickSettings {
    /// Seconds [0, 5], default 0.001.
    pub attack: f64,
    /// Seconds [0, 10], default 0.05.
    pub decay: f64,
    /// Level [0, 1], default 0.6.
    pub sustain: f64,
    /// Seconds [0, 10], default 0.3.
    pub release: f64,
    /// Sweep start in Hz [20, 2000], default 150.
    pub start_frequency: f64,
    /// Sweep end in Hz [20, 500], default 45.
    pub end_frequency: f64,
    /// Sweep time constant in seconds [0.001, 1], default 0.06.
    pub sweep: f64,
    /// Click level [0, 1], default 0.3.
    pub click: f64,
    /// Output gain [0, 2], default 1.
    pub gain: f64,
}

impl Default for KickSettings {
    fn default() -> Self {
        KickSettings {
            attack: 0.001,
            decay: 0.05,
            sustain: 0.6,
            release: 0.3,
            start_frequency: 150.0,
            end_frequency: 45.0,
            sweep: 0.06,
            click: 0.3,
            gain: 1.0,
        }
    }
}

impl KickSettings {
    pub fn shape(&self) -> EnvelopeShape {
        EnvelopeShape {
            attack: self.attack,
            decay: self.decay,
            sustain: self.sustain,
            release: self.release,
        }
    }
}

impl Settings for KickSettings {
    fn validated(self) -> Self {
        let d = KickSettings::default();
        let shape = validated_shape(self.shape(), d.shape());
        KickSettings {
            attack: shape.attack,
            decay: shape.decay,
            sustain: shape.sustain,
            release: shape.release,
            start_frequency: clamp_or(self.start_frequency, 20.0, 2000.0, d.start_frequency),
            end_frequency: clamp_or(self.end_frequency, 20.0, 500.0, d.end_frequency),
            sweep: clamp_or(self.sweep, 0.001, 1.0, d.sweep),
            click: clamp_or(self.click, 0.0, 1.0, d.click),
            gain: clamp_or(self.gain, 0.0, 2.0, d.gain),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KickVoice {
    settings: KickSettings,
    envelope: Envelope,
    noise: Noise,
    sample_rate: f64,
    phase: f64,
    /// Per-sample decay factors derived from the sweep and click times.
    sweep_coeff: f64,
    click_coeff: f64,
    sweep_level: f64,
    click_level: f64,
    ratio: f64,
    velocity: f64,
}

impl KickVoice {
    pub fn new(settings: &KickSettings, sample_rate: f64, seed: u64) -> Self {
        let mut voice = KickVoice {
            settings: settings.clone(),
            envelope: Envelope::new(settings.shape(), sample_rate),
            noise: Noise::new(seed),
            sample_rate,
            phase: 0.0,
            sweep_coeff: 0.0,
            click_coeff: (-1.0 / (CLICK_TIME * sample_rate)).exp(),
            sweep_level: 0.0,
            click_level: 0.0,
            ratio: 1.0,
            velocity: 0.0,
        };
        voice.update_settings(settings);
        voice
    }

    pub fn update_settings(&mut self, settings: &KickSettings) {
        self.settings = settings.clone();
        self.envelope.set_shape(settings.shape());
        self.sweep_coeff = (-1.0 / (settings.sweep * self.sample_rate)).exp();
    }

    pub fn trigger(&mut self, velocity: f64, pitch: u8) {
        self.velocity = velocity;
        self.ratio = pitch_ratio(pitch);
        self.phase = 0.0;
        self.sweep_level = 1.0;
        self.click_level = 1.0;
        self.envelope.trigger();
    }

    pub fn next_sample(&mut self) -> f64 {
        let Some(env) = envelope_gain(self.envelope.next_level()) else {
            return 0.0;
        };
        let s = &self.settings;
        let freq = (s.end_frequency + (s.start_frequency - s.end_frequency) * self.sweep_level) * self.ratio;
        self.sweep_level *= self.sweep_coeff;

        let body = (2.0 * PI * self.phase).sin();
        self.phase += freq / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }

        let click = self.noise.next_sample() * s.click * self.click_level;
        self.click_level *= self.click_coeff;

        (body + click) * env * self.velocity * s.gain
    }

    pub fn is_active(&self) -> bool {
        self.envelope.is_running()
    }
}
