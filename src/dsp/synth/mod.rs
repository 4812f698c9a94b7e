//! Synthesizer voices.
//!
//! The instrument set is closed: four procedural drums, one subtractive
//! synth, and a wavetable player for each recorded drum category. A track's
//! instrument tag picks an [`InstrumentKind`]; its settings bag decodes into
//! the matching [`InstrumentSettings`] variant; [`Voice::new`] builds the
//! voice state from those settings.

pub mod clap;
pub mod hihat;
pub mod kick;
pub mod sampled;
pub mod snare;
pub mod tone;

use serde_json::Value;

use crate::dsp::envelope::{EnvelopeLevel, EnvelopeShape};
use crate::dsp::wavetable::{DrumCategory, WavetableBank};
use crate::error::EngineError;
use crate::settings::{clamp_or, parse_settings};

pub use clap::{ClapSettings, ClapVoice};
pub use hihat::{HiHatSettings, HiHatVoice};
pub use kick::{KickSettings, KickVoice};
pub use sampled::{SampledSettings, SampledVoice};
pub use snare::{SnareSettings, SnareVoice};
pub use tone::{ToneSettings, ToneVoice};

/// MIDI pitch procedural drums are tuned to; other pitches transpose.
pub const REFERENCE_PITCH: f64 = 60.0;

// ── Instrument kinds ────────────────────────────────────────

/// Instrument selected by a track's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    Kick,
    Snare,
    HiHat,
    Clap,
    Synth,
    Sampled(DrumCategory),
}

impl InstrumentKind {
    /// Parse a track's instrument tag. Unknown tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "kick" => Some(InstrumentKind::Kick),
            "snare" => Some(InstrumentKind::Snare),
            "hihat" | "hi-hat" => Some(InstrumentKind::HiHat),
            "clap" => Some(InstrumentKind::Clap),
            "synth" => Some(InstrumentKind::Synth),
            _ => tag
                .strip_prefix("sampled-")
                .and_then(DrumCategory::from_tag)
                .map(InstrumentKind::Sampled),
        }
    }
}

/// Decoded settings for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentSettings {
    Kick(KickSettings),
    Snare(SnareSettings),
    HiHat(HiHatSettings),
    Clap(ClapSettings),
    Synth(ToneSettings),
    Sampled(DrumCategory, SampledSettings),
}

impl InstrumentSettings {
    /// Decode `value` for `kind`. `target` names the owner in errors.
    pub fn parse(kind: InstrumentKind, target: &str, value: &Value) -> Result<Self, EngineError> {
        Ok(match kind {
            InstrumentKind::Kick => InstrumentSettings::Kick(parse_settings(target, value)?),
            InstrumentKind::Snare => InstrumentSettings::Snare(parse_settings(target, value)?),
            InstrumentKind::HiHat => InstrumentSettings::HiHat(parse_settings(target, value)?),
            InstrumentKind::Clap => InstrumentSettings::Clap(parse_settings(target, value)?),
            InstrumentKind::Synth => InstrumentSettings::Synth(parse_settings(target, value)?),
            InstrumentKind::Sampled(category) => {
                InstrumentSettings::Sampled(category, parse_settings(target, value)?)
            }
        })
    }

    /// Default settings for `kind`.
    pub fn defaults(kind: InstrumentKind) -> Self {
        match kind {
            InstrumentKind::Kick => InstrumentSettings::Kick(KickSettings::default()),
            InstrumentKind::Snare => InstrumentSettings::Snare(SnareSettings::default()),
            InstrumentKind::HiHat => InstrumentSettings::HiHat(HiHatSettings::default()),
            InstrumentKind::Clap => InstrumentSettings::Clap(ClapSettings::default()),
            InstrumentKind::Synth => InstrumentSettings::Synth(ToneSettings::default()),
            InstrumentKind::Sampled(c) => InstrumentSettings::Sampled(c, SampledSettings::default()),
        }
    }

    pub fn kind(&self) -> InstrumentKind {
        match self {
            InstrumentSettings::Kick(_) => InstrumentKind::Kick,
            InstrumentSettings::Snare(_) => InstrumentKind::Snare,
            InstrumentSettings::HiHat(_) => InstrumentKind::HiHat,
            InstrumentSettings::Clap(_) => InstrumentKind::Clap,
            InstrumentSettings::Synth(_) => InstrumentKind::Synth,
            InstrumentSettings::Sampled(c, _) => InstrumentKind::Sampled(*c),
        }
    }
}

/// Clamp the shared envelope fields of a procedural instrument.
pub(crate) fn validated_shape(shape: EnvelopeShape, defaults: EnvelopeShape) -> EnvelopeShape {
    EnvelopeShape {
        attack: clamp_or(shape.attack, 0.0, 5.0, defaults.attack),
        decay: clamp_or(shape.decay, 0.0, 10.0, defaults.decay),
        sustain: clamp_or(shape.sustain, 0.0, 1.0, defaults.sustain),
        release: clamp_or(shape.release, 0.0, 10.0, defaults.release),
    }
}

/// Transposition ratio relative to [`REFERENCE_PITCH`].
#[inline]
pub(crate) fn pitch_ratio(pitch: u8) -> f64 {
    ((f64::from(pitch) - REFERENCE_PITCH) / 12.0).exp2()
}

/// Envelope gain for the current tick, `None` once the voice is done.
#[inline]
pub(crate) fn envelope_gain(level: EnvelopeLevel) -> Option<f64> {
    match level {
        EnvelopeLevel::Active(v) => Some(v),
        EnvelopeLevel::Finished | EnvelopeLevel::Idle => None,
    }
}

// ── Voices ──────────────────────────────────────────────────

/// One live synthesizer instance.
#[derive(Debug, Clone)]
pub enum Voice {
    Kick(KickVoice),
    Snare(SnareVoice),
    HiHat(HiHatVoice),
    Clap(ClapVoice),
    Synth(ToneVoice),
    Wavetable(SampledVoice),
}

impl Voice {
    /// Build a voice. `seed` feeds the voice's noise source; `makeup_gain`
    /// is the engine default for wavetable voices.
    pub fn new(settings: &InstrumentSettings, sample_rate: f64, makeup_gain: f64, seed: u64) -> Self {
        match settings {
            InstrumentSettings::Kick(s) => Voice::Kick(KickVoice::new(s, sample_rate, seed)),
            InstrumentSettings::Snare(s) => Voice::Snare(SnareVoice::new(s, sample_rate, seed)),
            InstrumentSettings::HiHat(s) => Voice::HiHat(HiHatVoice::new(s, sample_rate, seed)),
            InstrumentSettings::Clap(s) => Voice::Clap(ClapVoice::new(s, sample_rate, seed)),
            InstrumentSettings::Synth(s) => Voice::Synth(ToneVoice::new(s, sample_rate)),
            InstrumentSettings::Sampled(c, s) => {
                Voice::Wavetable(SampledVoice::new(*c, s, sample_rate, makeup_gain))
            }
        }
    }

    pub fn kind(&self) -> InstrumentKind {
        match self {
            Voice::Kick(_) => InstrumentKind::Kick,
            Voice::Snare(_) => InstrumentKind::Snare,
            Voice::HiHat(_) => InstrumentKind::HiHat,
            Voice::Clap(_) => InstrumentKind::Clap,
            Voice::Synth(_) => InstrumentKind::Synth,
            Voice::Wavetable(v) => InstrumentKind::Sampled(v.category()),
        }
    }

    /// Start a note. Wavetable voices pick their sample from `bank`.
    pub fn trigger(&mut self, velocity: f64, pitch: u8, bank: &WavetableBank) {
        let velocity = if velocity.is_finite() { velocity.clamp(0.0, 1.0) } else { 0.0 };
        match self {
            Voice::Kick(v) => v.trigger(velocity, pitch),
            Voice::Snare(v) => v.trigger(velocity, pitch),
            Voice::HiHat(v) => v.trigger(velocity, pitch),
            Voice::Clap(v) => v.trigger(velocity, pitch),
            Voice::Synth(v) => v.trigger(velocity, pitch),
            Voice::Wavetable(v) => v.trigger(velocity, pitch, bank),
        }
    }

    /// Apply new settings in place. Returns `false` when the settings belong
    /// to another instrument, in which case the voice must be replaced.
    pub fn update_settings(&mut self, settings: &InstrumentSettings) -> bool {
        match (self, settings) {
            (Voice::Kick(v), InstrumentSettings::Kick(s)) => v.update_settings(s),
            (Voice::Snare(v), InstrumentSettings::Snare(s)) => v.update_settings(s),
            (Voice::HiHat(v), InstrumentSettings::HiHat(s)) => v.update_settings(s),
            (Voice::Clap(v), InstrumentSettings::Clap(s)) => v.update_settings(s),
            (Voice::Synth(v), InstrumentSettings::Synth(s)) => v.update_settings(s),
            (Voice::Wavetable(v), InstrumentSettings::Sampled(c, s)) if v.category() == *c => {
                v.update_settings(s)
            }
            _ => return false,
        }
        true
    }

    /// Render one sample.
    #[inline]
    pub fn next_sample(&mut self) -> f64 {
        match self {
            Voice::Kick(v) => v.next_sample(),
            Voice::Snare(v) => v.next_sample(),
            Voice::HiHat(v) => v.next_sample(),
            Voice::Clap(v) => v.next_sample(),
            Voice::Synth(v) => v.next_sample(),
            Voice::Wavetable(v) => v.next_sample(),
        }
    }

    /// Whether the voice still produces sound.
    pub fn is_active(&self) -> bool {
        match self {
            Voice::Kick(v) => v.is_active(),
            Voice::Snare(v) => v.is_active(),
            Voice::HiHat(v) => v.is_active(),
            Voice::Clap(v) => v.is_active(),
            Voice::Synth(v) => v.is_active(),
            Voice::Wavetable(v) => v.is_active(),
        }
    }
}
