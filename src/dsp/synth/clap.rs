//! Hand clap: several quick bandpassed noise bursts followed by a tail.

use serde::Deserialize;

use super::{envelope_gain, pitch_ratio, validated_shape};
use crate::dsp::envelope::{Envelope, EnvelopeShape};
use crate::dsp::filter::{Biquad, BiquadCoefficients, FilterType};
use crate::dsp::oscillator::Noise;
use crate::settings::{Settings, clamp_or};

/// Decay time constant of a single burst, in seconds.
const BURST_TIME: f64 = 0.003;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClapSettings {
    /// Seconds [0, 5], default 0.001.
    pub attack: f64,
    /// Seconds [0, 10], default 0.08.
    pub decay: f64,
    /// Level [0, 1], default 0.25.
    pub sustain: f64,
    /// Seconds [0, 10], default 0.2.
    pub release: f64,
    /// Number of bursts before the tail [1, 8], default 3.
    pub bursts: u32,
    /// Seconds between bursts [0.001, 0.05], default 0.01.
    pub burst_spacing: f64,
    /// Bandpass centre in Hz [200, 8000], default 1200.
    pub frequency: f64,
    /// Bandpass Q [0.3, 10], default 2.
    pub q: f64,
    /// Output gain [0, 2], default 1.
    pub gain: f64,
}

impl Default for ClapSettings {
    fn default() -> Self {
        ClapSettings {
            attack: 0.001,
            decay: 0.08,
            sustain: 0.25,
            release: 0.2,
            bursts: 3,
            burst_spacing: 0.01,
            frequency: 1200.0,
            q: 2.0,
            gain: 1.0,
        }
    }
}

impl ClapSettings {
    pub fn shape(&self) -> EnvelopeShape {
        EnvelopeShape {
            attack: self.attack,
            decay: self.decay,
            sustain: self.sustain,
            release: self.release,
        }
    }
}

impl Settings for ClapSettings {
    fn validated(self) -> Self {
        let d = ClapSettings::default();
        let shape = validated_shape(self.shape(), d.shape());
        ClapSettings {
            attack: shape.attack,
            decay: shape.decay,
            sustain: shape.sustain,
            release: shape.release,
            bursts: self.bursts.clamp(1, 8),
            burst_spacing: clamp_or(self.burst_spacing, 0.001, 0.05, d.burst_spacing),
            frequency: clamp_or(self.frequency, 200.0, 8000.0, d.frequency),
            q: clamp_or(self.q, 0.3, 10.0, d.q),
            gain: clamp_or(self.gain, 0.0, 2.0, d.gain),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClapVoice {
    settings: ClapSettings,
    envelope: Envelope,
    noise: Noise,
    bandpass: Biquad,
    sample_rate: f64,
    spacing_samples: u64,
    burst_coeff: f64,
    burst_level: f64,
    elapsed: u64,
    designed_ratio: f64,
    velocity: f64,
}

impl ClapVoice {
    pub fn new(settings: &ClapSettings, sample_rate: f64, seed: u64) -> Self {
        let mut voice = ClapVoice {
            settings: settings.clone(),
            envelope: Envelope::new(settings.shape(), sample_rate),
            noise: Noise::new(seed),
            bandpass: Biquad::default(),
            sample_rate,
            spacing_samples: 1,
            burst_coeff: (-1.0 / (BURST_TIME * sample_rate)).exp(),
            burst_level: 0.0,
            elapsed: 0,
            designed_ratio: 1.0,
            velocity: 0.0,
        };
        voice.update_settings(settings);
        voice
    }

    pub fn update_settings(&mut self, settings: &ClapSettings) {
        self.settings = settings.clone();
        self.envelope.set_shape(settings.shape());
        self.spacing_samples = ((settings.burst_spacing * self.sample_rate).round() as u64).max(1);
        self.design(self.designed_ratio);
    }

    fn design(&mut self, ratio: f64) {
        self.bandpass.set_coefficients(BiquadCoefficients::design(
            FilterType::Bandpass,
            self.settings.frequency * ratio,
            self.settings.q,
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
        self.elapsed = 0;
        self.burst_level = 1.0;
        self.bandpass.reset();
        self.envelope.trigger();
    }

    pub fn next_sample(&mut self) -> f64 {
        let Some(env) = envelope_gain(self.envelope.next_level()) else {
            return 0.0;
        };
        let s = &self.settings;
        let bursts_end = self.spacing_samples * u64::from(s.bursts);

        let shaping = if self.elapsed < bursts_end {
            if self.elapsed % self.spacing_samples == 0 {
                self.burst_level = 1.0;
            }
            let level = self.burst_level;
            self.burst_level *= self.burst_coeff;
            level
        } else {
            1.0
        };
        self.elapsed += 1;

        let filtered = self.bandpass.process(self.noise.next_sample());
        filtered * shaping * env * self.velocity * s.gain * 2.0
    }

    pub fn is_active(&self) -> bool {
        self.envelope.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bursts_restart_the_transient() {
        let settings = ClapSettings {
            attack: 0.0,
            decay: 0.0,
            sustain: 1.0,
            release: 1.0,
            ..Default::default()
        };
        let mut voice = ClapVoice::new(&settings, 44100.0, 5);
        voice.trigger(1.0, 60);
        let spacing = voice.spacing_samples as usize;
        let out: Vec<f64> = (0..spacing * 3).map(|_| voice.next_sample().abs()).collect();

        // Energy at the start of the second burst exceeds the end of the first.
        let tail_of_first: f64 = out[spacing - 40..spacing].iter().sum();
        let head_of_second: f64 = out[spacing..spacing + 40].iter().sum();
        assert!(
            head_of_second > tail_of_first,
            "second burst should be louder than the first's tail ({head_of_second} vs {tail_of_first})"
        );
    }

    #[test]
    fn burst_count_is_clamped() {
        let s = ClapSettings {
            bursts: 99,
            ..Default::default()
        }
        .validated();
        assert_eq!(s.bursts, 8);
    }
}
