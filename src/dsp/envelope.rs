//! One-shot envelope shared by every procedural synth voice.
//!
//! Shape: cosine-eased attack (0 → 1), linear decay to the sustain level,
//! linear release to 0, then a half-Hann fade-out lasting
//! `max(0.1 s, 0.3 · release)` so the note always ends without a click.

use std::f64::consts::PI;

/// Minimum length of the closing fade, in seconds.
pub const MIN_FADE_SECONDS: f64 = 0.1;

/// Closing fade length as a fraction of the release time.
pub const FADE_RELEASE_RATIO: f64 = 0.3;

/// Output of one envelope tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnvelopeLevel {
    /// Still sounding, value in [0, 1].
    Active(f64),
    /// The envelope just ended. Reported exactly once per trigger.
    Finished,
    /// Not triggered, or already finished.
    Idle,
}

impl EnvelopeLevel {
    /// Gain to apply: the active value, otherwise silence.
    pub fn gain(self) -> f64 {
        match self {
            EnvelopeLevel::Active(v) => v,
            _ => 0.0,
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, EnvelopeLevel::Active(_))
    }
}

/// Envelope timing in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeShape {
    pub attack: f64,
    pub decay: f64,
    /// Level held between decay and release [0, 1].
    pub sustain: f64,
    pub release: f64,
}

impl Default for EnvelopeShape {
    fn default() -> Self {
        EnvelopeShape {
            attack: 0.005,
            decay: 0.1,
            sustain: 0.7,
            release: 0.3,
        }
    }
}

/// Sample-counted envelope generator.
#[derive(Debug, Clone)]
pub struct Envelope {
    shape: EnvelopeShape,
    sample_rate: f64,
    attack: u64,
    decay: u64,
    release: u64,
    fade: u64,
    position: u64,
    running: bool,
}

impl Envelope {
    pub fn new(shape: EnvelopeShape, sample_rate: f64) -> Self {
        let mut env = Envelope {
            shape,
            sample_rate,
            attack: 0,
            decay: 0,
            release: 0,
            fade: 0,
            position: 0,
            running: false,
        };
        env.set_shape(shape);
        env
    }

    /// Replace the timing. A running envelope continues from its position.
    pub fn set_shape(&mut self, shape: EnvelopeShape) {
        let to_samples = |seconds: f64| (seconds.max(0.0) * self.sample_rate).round() as u64;
        self.shape = EnvelopeShape {
            sustain: shape.sustain.clamp(0.0, 1.0),
            ..shape
        };
        self.attack = to_samples(shape.attack);
        self.decay = to_samples(shape.decay);
        self.release = to_samples(shape.release);
        self.fade = to_samples(MIN_FADE_SECONDS).max((FADE_RELEASE_RATIO * self.release as f64).round() as u64);
    }

    pub fn shape(&self) -> EnvelopeShape {
        self.shape
    }

    /// Restart from the beginning of the attack.
    pub fn trigger(&mut self) {
        self.position = 0;
        self.running = true;
    }

    /// Stop immediately without reporting `Finished`.
    pub fn reset(&mut self) {
        self.position = 0;
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Samples from trigger until `Finished` is reported.
    pub fn total_samples(&self) -> u64 {
        self.attack + self.decay + self.release + self.fade
    }

    /// Samples elapsed since the last trigger.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// The envelope value at `position` samples after trigger, or `None`
    /// once the full shape has elapsed.
    pub fn level_at(&self, position: u64) -> Option<f64> {
        let mut p = position;
        if p < self.attack {
            let t = p as f64 / self.attack as f64;
            return Some((0.5 - 0.5 * (PI * t).cos()).clamp(0.0, 1.0));
        }
        p -= self.attack;

        let sustain = self.shape.sustain;
        if p < self.decay {
            let t = p as f64 / self.decay as f64;
            return Some((1.0 - (1.0 - sustain) * t).clamp(0.0, 1.0));
        }
        p -= self.decay;

        if p < self.release {
            let t = p as f64 / self.release as f64;
            return Some((sustain * (1.0 - t)).clamp(0.0, 1.0));
        }
        p -= self.release;

        if p < self.fade {
            // Linear release already lands on zero; without a release the
            // fade carries the sustain level down instead.
            let from = if self.release == 0 { sustain } else { 0.0 };
            let t = p as f64 / self.fade as f64;
            return Some((from * 0.5 * (1.0 + (PI * t).cos())).clamp(0.0, 1.0));
        }
        None
    }

    /// Advance one sample.
    pub fn next_level(&mut self) -> EnvelopeLevel {
        if !self.running {
            return EnvelopeLevel::Idle;
        }
        match self.level_at(self.position) {
            Some(v) => {
                self.position += 1;
                EnvelopeLevel::Active(v)
            }
            None => {
                self.running = false;
                EnvelopeLevel::Finished
            }
        }
    }
}
