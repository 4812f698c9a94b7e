//! Insert effects.
//!
//! Eight effect types, each split into a settings struct (decoded and clamped
//! on the control plane) and a state struct (delay lines, filter history, LFO
//! phase) owned by exactly one effect instance on one route. States keep a
//! copy of the parameters their derived coefficients were computed from and
//! redesign only when those change.

pub mod chorus;
pub mod compressor;
pub mod delay;
pub mod distortion;
pub mod equalizer;
pub mod filter;
pub mod reverb;
pub mod saturator;

use serde_json::Value;

use crate::error::EngineError;
use crate::settings::parse_settings;

pub use chorus::{ChorusSettings, ChorusState};
pub use compressor::{CompressorSettings, CompressorState};
pub use delay::{DelayLine, DelaySettings, DelayState};
pub use distortion::{DistortionSettings, DistortionState};
pub use equalizer::{EqualizerSettings, EqualizerState};
pub use filter::{FilterSettings, FilterState};
pub use reverb::{ReverbSettings, ReverbState};
pub use saturator::{SaturatorSettings, SaturatorState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Filter,
    Delay,
    Reverb,
    Distortion,
    Compressor,
    Chorus,
    Saturator,
    Equalizer,
}

impl EffectKind {
    /// Parse an effect type tag. Unknown tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "filter" => Some(EffectKind::Filter),
            "delay" => Some(EffectKind::Delay),
            "reverb" => Some(EffectKind::Reverb),
            "distortion" => Some(EffectKind::Distortion),
            "compressor" => Some(EffectKind::Compressor),
            "chorus" => Some(EffectKind::Chorus),
            "saturator" => Some(EffectKind::Saturator),
            "equalizer" | "eq" => Some(EffectKind::Equalizer),
            _ => None,
        }
    }
}

/// Decoded settings for one effect instance.
#[derive(Debug, Clone, PartialEq)]
pub enum EffectSettings {
    Filter(FilterSettings),
    Delay(DelaySettings),
    Reverb(ReverbSettings),
    Distortion(DistortionSettings),
    Compressor(CompressorSettings),
    Chorus(ChorusSettings),
    Saturator(SaturatorSettings),
    Equalizer(EqualizerSettings),
}

impl EffectSettings {
    /// Decode `value` for `kind`. `target` names the owner in errors.
    pub fn parse(kind: EffectKind, target: &str, value: &Value) -> Result<Self, EngineError> {
        Ok(match kind {
            EffectKind::Filter => EffectSettings::Filter(parse_settings(target, value)?),
            EffectKind::Delay => EffectSettings::Delay(parse_settings(target, value)?),
            EffectKind::Reverb => EffectSettings::Reverb(parse_settings(target, value)?),
            EffectKind::Distortion => EffectSettings::Distortion(parse_settings(target, value)?),
            EffectKind::Compressor => EffectSettings::Compressor(parse_settings(target, value)?),
            EffectKind::Chorus => EffectSettings::Chorus(parse_settings(target, value)?),
            EffectKind::Saturator => EffectSettings::Saturator(parse_settings(target, value)?),
            EffectKind::Equalizer => EffectSettings::Equalizer(parse_settings(target, value)?),
        })
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            EffectSettings::Filter(_) => EffectKind::Filter,
            EffectSettings::Delay(_) => EffectKind::Delay,
            EffectSettings::Reverb(_) => EffectKind::Reverb,
            EffectSettings::Distortion(_) => EffectKind::Distortion,
            EffectSettings::Compressor(_) => EffectKind::Compressor,
            EffectSettings::Chorus(_) => EffectKind::Chorus,
            EffectSettings::Saturator(_) => EffectKind::Saturator,
            EffectSettings::Equalizer(_) => EffectKind::Equalizer,
        }
    }
}

/// Private DSP state of one effect instance.
#[derive(Debug, Clone)]
pub enum EffectState {
    Filter(FilterState),
    Delay(DelayState),
    Reverb(ReverbState),
    Distortion(DistortionState),
    Compressor(CompressorState),
    Chorus(ChorusState),
    Saturator(SaturatorState),
    Equalizer(EqualizerState),
}

impl EffectState {
    /// Allocate state for `kind`, including any delay buffers.
    pub fn new(kind: EffectKind, sample_rate: f64) -> Self {
        match kind {
            EffectKind::Filter => EffectState::Filter(FilterState::new(sample_rate)),
            EffectKind::Delay => EffectState::Delay(DelayState::new(sample_rate)),
            EffectKind::Reverb => EffectState::Reverb(ReverbState::new(sample_rate)),
            EffectKind::Distortion => EffectState::Distortion(DistortionState),
            EffectKind::Compressor => EffectState::Compressor(CompressorState::new(sample_rate)),
            EffectKind::Chorus => EffectState::Chorus(ChorusState::new(sample_rate)),
            EffectKind::Saturator => EffectState::Saturator(SaturatorState::new(sample_rate)),
            EffectKind::Equalizer => EffectState::Equalizer(EqualizerState::new(sample_rate)),
        }
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            EffectState::Filter(_) => EffectKind::Filter,
            EffectState::Delay(_) => EffectKind::Delay,
            EffectState::Reverb(_) => EffectKind::Reverb,
            EffectState::Distortion(_) => EffectKind::Distortion,
            EffectState::Compressor(_) => EffectKind::Compressor,
            EffectState::Chorus(_) => EffectKind::Chorus,
            EffectState::Saturator(_) => EffectKind::Saturator,
            EffectState::Equalizer(_) => EffectKind::Equalizer,
        }
    }

    /// Process one sample. Settings of another kind pass the input through.
    #[inline]
    pub fn process(&mut self, input: f64, settings: &EffectSettings) -> f64 {
        let output = match (self, settings) {
            (EffectState::Filter(st), EffectSettings::Filter(s)) => st.process(input, s),
            (EffectState::Delay(st), EffectSettings::Delay(s)) => st.process(input, s),
            (EffectState::Reverb(st), EffectSettings::Reverb(s)) => st.process(input, s),
            (EffectState::Distortion(st), EffectSettings::Distortion(s)) => st.process(input, s),
            (EffectState::Compressor(st), EffectSettings::Compressor(s)) => st.process(input, s),
            (EffectState::Chorus(st), EffectSettings::Chorus(s)) => st.process(input, s),
            (EffectState::Saturator(st), EffectSettings::Saturator(s)) => st.process(input, s),
            (EffectState::Equalizer(st), EffectSettings::Equalizer(s)) => st.process(input, s),
            _ => input,
        };
        if output.is_finite() { output } else { 0.0 }
    }
}

/// Soft clip shared by distortion and saturator: `tanh(x · drive)` blended
/// toward a hard clip once `drive` passes [`HARD_CLIP_THRESHOLD`].
pub const HARD_CLIP_THRESHOLD: f64 = 0.7;

/// Drive stage. `drive` is normalized [0, 1].
#[inline]
pub fn drive_stage(x: f64, drive: f64) -> f64 {
    let gain = 1.0 + drive * 19.0;
    let driven = x * gain;
    let soft = driven.tanh();
    if drive <= HARD_CLIP_THRESHOLD {
        return soft;
    }
    let hard = driven.clamp(-1.0, 1.0);
    let blend = (drive - HARD_CLIP_THRESHOLD) / (1.0 - HARD_CLIP_THRESHOLD);
    soft * (1.0 - blend) + hard * blend
}

/// Decibels to linear amplitude.
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Linear amplitude to decibels, floored at -120 dB.
#[inline]
pub fn linear_to_db(linear: f64) -> f64 {
    if linear <= 1e-6 {
        -120.0
    } else {
        20.0 * linear.log10()
    }
}
