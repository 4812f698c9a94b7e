//! Subtractive synth: one PolyBLEP oscillator into a resonant lowpass.

use serde::Deserialize;

use super::{envelope_gain, validated_shape};
use crate::dsp::envelope::{Envelope, EnvelopeShape};
use crate::dsp::filter::{BiquadFilter, FilterType};
use crate::dsp::oscillator::{Oscillator, Waveform, midi_to_hz};
use crate::settings::{Settings, clamp_or};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToneSettings {
    pub waveform: Waveform,
    /// Cents [-1200, 1200], default 0.
    pub detune: f64,
    /// Lowpass cutoff in Hz [20, 20000], default 4000.
    pub cutoff: f64,
    /// Lowpass Q [0.1, 20], default 0.707.
    pub resonance: f64,
    /// Seconds [0, 5], default 0.005.
    pub attack: f64,
    /// Seconds [0, 10], default 0.1.
    pub decay: f64,
    /// Level [0, 1], default 0.7.
    pub sustain: f64,
    /// Seconds [0, 10], default 0.3.
    pub release: f64,
    /// Output gain [0, 2], default 0.5.
    pub gain: f64,
}

impl Default for ToneSettings {
    fn default() -> Self {
        let shape = EnvelopeShape::default();
        ToneSettings {
            waveform: Waveform::Sawtooth,
            detune: 0.0,
            cutoff: 4000.0,
            resonance: std::f64::consts::FRAC_1_SQRT_2,
            attack: shape.attack,
            decay: shape.decay,
            sustain: shape.sustain,
            release: shape.release,
            gain: 0.5,
        }
    }
}

impl ToneSettings {
    pub fn shape(&self) -> EnvelopeShape {
        EnvelopeShape {
            attack: self.attack,
            decay: self.decay,
            sustain: self.sustain,
            release: self.release,
        }
    }
}

impl Settings for ToneSettings {
    fn validated(self) -> Self {
        let d = ToneSettings::default();
        let shape = validated_shape(self.shape(), d.shape());
        ToneSettings {
            waveform: self.waveform,
            detune: clamp_or(self.detune, -1200.0, 1200.0, d.detune),
            cutoff: clamp_or(self.cutoff, 20.0, 20000.0, d.cutoff),
            resonance: clamp_or(self.resonance, 0.1, 20.0, d.resonance),
            attack: shape.attack,
            decay: shape.decay,
            sustain: shape.sustain,
            release: shape.release,
            gain: clamp_or(self.gain, 0.0, 2.0, d.gain),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToneVoice {
    oscillator: Oscillator,
    filter: BiquadFilter,
    envelope: Envelope,
    gain: f64,
    velocity: f64,
}

impl ToneVoice {
    pub fn new(settings: &ToneSettings, sample_rate: f64) -> Self {
        let mut voice = ToneVoice {
            oscillator: Oscillator::new(settings.waveform, sample_rate),
            filter: BiquadFilter::new(FilterType::Lowpass, sample_rate),
            envelope: Envelope::new(settings.shape(), sample_rate),
            gain: settings.gain,
            velocity: 0.0,
        };
        voice.update_settings(settings);
        voice
    }

    pub fn update_settings(&mut self, settings: &ToneSettings) {
        self.oscillator.waveform = settings.waveform;
        self.oscillator.detune = settings.detune;
        self.filter.set_frequency(settings.cutoff);
        self.filter.set_q(settings.resonance);
        self.envelope.set_shape(settings.shape());
        self.gain = settings.gain;
    }

    pub fn trigger(&mut self, velocity: f64, pitch: u8) {
        self.velocity = velocity;
        self.oscillator.frequency = midi_to_hz(f64::from(pitch));
        self.oscillator.reset();
        self.filter.reset();
        self.envelope.trigger();
    }

    pub fn next_sample(&mut self) -> f64 {
        let Some(env) = envelope_gain(self.envelope.next_level()) else {
            return 0.0;
        };
        let raw = self.oscillator.next_sample();
        self.filter.process(raw) * env * self.velocity * self.gain
    }

    pub fn is_active(&self) -> bool {
        self.envelope.is_running()
    }
}
