//! Reverb effect: Schroeder-style algorithmic reverb.
//!
//! Four parallel damped comb filters with prime-spaced delays, followed in
//! series by two allpass diffusers. Comb feedback is derived from the target
//! decay time so every comb reaches -60 dB after `decay` seconds.

use serde::Deserialize;

use crate::settings::{Settings, clamp_or};

// Tuning constants (scaled for 44100 Hz sample rate)
const COMB_TUNING: [usize; 4] = [1307, 1637, 1811, 1931];
const ALLPASS_TUNING: [usize; 2] = [223, 73];
const ALLPASS_FEEDBACK: f64 = 0.5;

/// A comb filter delay line with damped feedback.
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f64>,
    index: usize,
    feedback: f64,
    filterstore: f64,
}

impl CombFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            feedback: 0.0,
            filterstore: 0.0,
        }
    }

    /// Feedback giving a 60 dB drop after `decay` seconds.
    fn set_decay(&mut self, decay: f64, sample_rate: f64) {
        self.feedback = 0.001_f64.powf(self.buffer.len() as f64 / (sample_rate * decay));
    }

    #[inline]
    fn process(&mut self, input: f64, damp: f64) -> f64 {
        let output = self.buffer[self.index];

        // Lowpass in the loop (damping)
        self.filterstore = output * (1.0 - damp) + self.filterstore * damp;

        self.buffer[self.index] = input + self.filterstore * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();

        output
    }
}

/// An allpass filter delay line.
#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f64>,
    index: usize,
}

impl AllpassFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        let bufout = self.buffer[self.index];
        let output = bufout - input;

        self.buffer[self.index] = input + bufout * ALLPASS_FEEDBACK;
        self.index = (self.index + 1) % self.buffer.len();

        output
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReverbSettings {
    /// Time to fall by 60 dB, in seconds [0.1, 10]. Default 1.5.
    pub decay: f64,
    /// High-frequency damping [0, 1], higher is darker. Default 0.3.
    pub damping: f64,
    /// Dry/wet mix [0, 1]. Default 0.25.
    pub mix: f64,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        ReverbSettings {
            decay: 1.5,
            damping: 0.3,
            mix: 0.25,
        }
    }
}

impl Settings for ReverbSettings {
    fn validated(self) -> Self {
        let d = ReverbSettings::default();
        ReverbSettings {
            decay: clamp_or(self.decay, 0.1, 10.0, d.decay),
            damping: clamp_or(self.damping, 0.0, 1.0, d.damping),
            mix: clamp_or(self.mix, 0.0, 1.0, d.mix),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReverbState {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
    sample_rate: f64,
    /// Decay the comb feedback was computed for.
    tuned_decay: Option<f64>,
}

impl ReverbState {
    pub fn new(sample_rate: f64) -> Self {
        let scale = sample_rate / 44100.0;
        let sized = |t: usize| ((t as f64) * scale).round() as usize;
        ReverbState {
            combs: COMB_TUNING.iter().map(|&t| CombFilter::new(sized(t))).collect(),
            allpasses: ALLPASS_TUNING
                .iter()
                .map(|&t| AllpassFilter::new(sized(t)))
                .collect(),
            sample_rate,
            tuned_decay: None,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64, settings: &ReverbSettings) -> f64 {
        if self.tuned_decay != Some(settings.decay) {
            for comb in &mut self.combs {
                comb.set_decay(settings.decay, self.sample_rate);
            }
            self.tuned_decay = Some(settings.decay);
        }

        let mut wet = 0.0;
        for comb in &mut self.combs {
            wet += comb.process(input, settings.damping);
        }
        wet /= self.combs.len() as f64;
        for allpass in &mut self.allpasses {
            wet = allpass.process(wet);
        }

        input * (1.0 - settings.mix) + wet * settings.mix
    }
}
