//! Wavetable drum voice: plays one recorded sample per trigger.
//!
//! The sample is read at a fractional phase with linear interpolation, so
//! pitch changes resample the recording. A retrigger keeps the previous note
//! alive for a few milliseconds as a fading tail instead of cutting it.

use serde::Deserialize;

use crate::dsp::wavetable::{DrumCategory, SampleData, WavetableBank};
use crate::settings::{Settings, clamp_or};

/// Length of the retrigger crossfade, in seconds.
pub const RETRIGGER_FADE_SECONDS: f64 = 0.005;

/// Envelope level (-60 dBFS) below which a decaying note is stopped.
pub const SILENCE_THRESHOLD: f64 = 0.001;

/// Share of the sample at its end that is faded out.
const END_FADE_FRACTION: f64 = 0.01;

/// DC blocker pole.
const DC_POLE: f64 = 0.995;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SampledSettings {
    /// Sample name within the category; the first by name when absent.
    pub sample: Option<String>,
    /// MIDI pitch at which the sample plays unshifted [0, 127], default 60.
    pub base_pitch: f64,
    /// Linear attack in seconds [0, 1], default 0.001.
    pub attack: f64,
    /// Exponential decay time constant in seconds [0.01, 30], default 1.
    pub decay: f64,
    /// Level the decay settles to [0, 1], default 0.
    pub sustain: f64,
    /// Overrides the engine makeup gain [0, 8].
    pub makeup_gain: Option<f64>,
}

impl Default for SampledSettings {
    fn default() -> Self {
        SampledSettings {
            sample: None,
            base_pitch: 60.0,
            attack: 0.001,
            decay: 1.0,
            sustain: 0.0,
            makeup_gain: None,
        }
    }
}

impl Settings for SampledSettings {
    fn validated(self) -> Self {
        let d = SampledSettings::default();
        SampledSettings {
            sample: self.sample,
            base_pitch: clamp_or(self.base_pitch, 0.0, 127.0, d.base_pitch),
            attack: clamp_or(self.attack, 0.0, 1.0, d.attack),
            decay: clamp_or(self.decay, 0.01, 30.0, d.decay),
            sustain: clamp_or(self.sustain, 0.0, 1.0, d.sustain),
            makeup_gain: self
                .makeup_gain
                .filter(|g| g.is_finite())
                .map(|g| g.clamp(0.0, 8.0)),
        }
    }
}

/// Playback speed for `pitch` against `base_pitch`: one octave doubles it.
#[inline]
pub fn playback_speed(pitch: f64, base_pitch: f64) -> f64 {
    ((pitch - base_pitch) / 12.0).exp2()
}

/// Linear interpolation at a fractional index. Out-of-range reads are silent.
#[inline]
fn read_interpolated(data: &[f32], phase: f64) -> f64 {
    if phase < 0.0 {
        return 0.0;
    }
    let idx = phase as usize;
    let Some(&a) = data.get(idx) else {
        return 0.0;
    };
    let b = data.get(idx + 1).copied().unwrap_or(0.0);
    let frac = phase - idx as f64;
    f64::from(a) * (1.0 - frac) + f64::from(b) * frac
}

/// One read head over a sample.
#[derive(Debug, Clone)]
struct Playhead {
    data: SampleData,
    phase: f64,
    speed: f64,
    /// Samples rendered since trigger.
    elapsed: u64,
    /// Velocity times makeup gain.
    level: f64,
}

impl Playhead {
    fn is_finished(&self) -> bool {
        self.phase >= self.data.len() as f64
    }

    /// Sample value with the end-of-sample fade, before the envelope.
    fn read(&self) -> f64 {
        let len = self.data.len() as f64;
        let raw = read_interpolated(&self.data, self.phase);
        let fade_len = len * END_FADE_FRACTION;
        let remaining = len - self.phase;
        if fade_len > 0.0 && remaining < fade_len {
            raw * (remaining / fade_len).clamp(0.0, 1.0)
        } else {
            raw
        }
    }

    fn advance(&mut self) {
        self.phase += self.speed;
        self.elapsed += 1;
    }
}

/// The previous note fading out after a retrigger.
#[derive(Debug, Clone)]
struct Tail {
    head: Playhead,
    envelope: f64,
    remaining: u64,
    total: u64,
}

#[derive(Debug, Clone)]
pub struct SampledVoice {
    category: DrumCategory,
    settings: SampledSettings,
    sample_rate: f64,
    default_makeup: f64,
    attack_samples: u64,
    fade_samples: u64,
    head: Option<Playhead>,
    tail: Option<Tail>,
    dc_x1: f64,
    dc_y1: f64,
}

impl SampledVoice {
    pub fn new(
        category: DrumCategory,
        settings: &SampledSettings,
        sample_rate: f64,
        default_makeup: f64,
    ) -> Self {
        let mut voice = SampledVoice {
            category,
            settings: settings.clone(),
            sample_rate,
            default_makeup,
            attack_samples: 0,
            fade_samples: ((RETRIGGER_FADE_SECONDS * sample_rate).round() as u64).max(1),
            head: None,
            tail: None,
            dc_x1: 0.0,
            dc_y1: 0.0,
        };
        voice.update_settings(settings);
        voice
    }

    pub fn category(&self) -> DrumCategory {
        self.category
    }

    pub fn update_settings(&mut self, settings: &SampledSettings) {
        self.settings = settings.clone();
        self.attack_samples = (settings.attack * self.sample_rate).round() as u64;
    }

    fn makeup_gain(&self) -> f64 {
        self.settings.makeup_gain.unwrap_or(self.default_makeup)
    }

    /// Envelope value `elapsed` samples after trigger.
    fn envelope_at(&self, elapsed: u64) -> f64 {
        if elapsed < self.attack_samples {
            return elapsed as f64 / self.attack_samples as f64;
        }
        let since_attack = (elapsed - self.attack_samples) as f64 / self.sample_rate;
        let sustain = self.settings.sustain;
        sustain + (1.0 - sustain) * (-since_attack / self.settings.decay).exp()
    }

    /// Start a note. With no sample available the voice stays silent.
    pub fn trigger(&mut self, velocity: f64, pitch: u8, bank: &WavetableBank) {
        if let Some(previous) = self.head.take() {
            if !previous.is_finished() {
                let envelope = self.envelope_at(previous.elapsed);
                self.tail = Some(Tail {
                    head: previous,
                    envelope,
                    remaining: self.fade_samples,
                    total: self.fade_samples,
                });
            }
        }

        let Some(data) = bank.select(self.category, self.settings.sample.as_deref()) else {
            return;
        };
        self.head = Some(Playhead {
            data,
            phase: 0.0,
            speed: playback_speed(f64::from(pitch), self.settings.base_pitch),
            elapsed: 0,
            level: velocity * self.makeup_gain(),
        });
    }

    pub fn next_sample(&mut self) -> f64 {
        let mut x = 0.0;

        if let Some(head) = &self.head {
            if head.is_finished() {
                self.head = None;
            } else {
                let env = self.envelope_at(head.elapsed);
                if head.elapsed >= self.attack_samples && env < SILENCE_THRESHOLD {
                    self.head = None;
                } else {
                    x += head.read() * env * head.level;
                }
            }
        }
        if let Some(head) = &mut self.head {
            head.advance();
        }

        if let Some(tail) = &mut self.tail {
            if tail.remaining == 0 || tail.head.is_finished() {
                self.tail = None;
            } else {
                let fade = tail.remaining as f64 / tail.total as f64;
                x += tail.head.read() * tail.envelope * tail.head.level * fade;
                tail.head.advance();
                tail.remaining -= 1;
            }
        }

        let y = x - self.dc_x1 + DC_POLE * self.dc_y1;
        self.dc_x1 = x;
        self.dc_y1 = y;
        y
    }

    /// Sounding, either the current note or a retrigger tail.
    pub fn is_active(&self) -> bool {
        self.head.is_some() || self.tail.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const SR: f64 = 44100.0;

    fn bank_with(data: Vec<f32>) -> WavetableBank {
        let mut bank = WavetableBank::new();
        bank.insert(DrumCategory::Kick, "test", Arc::<[f32]>::from(data));
        bank
    }

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| (i as f32 * 0.01).sin()).collect()
    }

    #[test]
    fn pitch_to_speed_law() {
        assert_eq!(playback_speed(60.0, 60.0), 1.0);
        assert_eq!(playback_speed(72.0, 60.0), 2.0);
        assert_eq!(playback_speed(48.0, 60.0), 0.5);
        assert_eq!(playback_speed(50.0, 38.0), 2.0);
    }

    #[test]
    fn interpolation_between_neighbours() {
        let data = [0.0_f32, 1.0, 0.0];
        assert_eq!(read_interpolated(&data, 0.5), 0.5);
        assert_eq!(read_interpolated(&data, 1.0), 1.0);
        assert_eq!(read_interpolated(&data, 3.0), 0.0);
        assert_eq!(read_interpolated(&data, -1.0), 0.0);
    }

    #[test]
    fn plays_once_then_goes_inactive() {
        let bank = bank_with(ramp(1000));
        let settings = SampledSettings {
            decay: 30.0,
            ..Default::default()
        };
        let mut voice = SampledVoice::new(DrumCategory::Kick, &settings, SR, 1.5);
        voice.trigger(1.0, 72, &bank);
        let mut n: usize = 0;
        while voice.is_active() {
            voice.next_sample();
            n += 1;
            assert!(n < 10_000, "voice never stopped");
        }
        // Double speed covers 1000 samples in 500 steps.
        assert_eq!(n, 501);
    }

    #[test]
    fn silent_without_a_sample() {
        let bank = WavetableBank::new();
        let mut voice = SampledVoice::new(DrumCategory::Snare, &SampledSettings::default(), SR, 1.5);
        voice.trigger(1.0, 60, &bank);
        assert!(!voice.is_active());
        assert_eq!(voice.next_sample(), 0.0);
    }

    #[test]
    fn decay_below_threshold_stops_playback() {
        let bank = bank_with(vec![0.5; 200_000]);
        let settings = SampledSettings {
            attack: 0.0,
            decay: 0.01,
            ..Default::default()
        };
        let mut voice = SampledVoice::new(DrumCategory::Kick, &settings, SR, 1.5);
        voice.trigger(1.0, 60, &bank);
        let mut n: usize = 0;
        while voice.is_active() {
            voice.next_sample();
            n += 1;
        }
        // exp(-t / 0.01) < 0.001 after about 69 ms.
        let expected = (0.01 * 1000.0_f64.ln() * SR) as usize;
        assert!(n.abs_diff(expected) < 5, "stopped after {n}, expected ~{expected}");
    }

    #[test]
    fn retrigger_keeps_a_short_tail() {
        let bank = bank_with(vec![0.5; 10_000]);
        let settings = SampledSettings {
            attack: 0.0,
            decay: 30.0,
            ..Default::default()
        };
        let mut voice = SampledVoice::new(DrumCategory::Kick, &settings, SR, 1.0);
        voice.trigger(1.0, 60, &bank);
        for _ in 0..100 {
            voice.next_sample();
        }
        voice.trigger(1.0, 60, &bank);
        assert!(voice.tail.is_some(), "previous note should fade, not cut");
        for _ in 0..voice.fade_samples + 1 {
            voice.next_sample();
        }
        assert!(voice.tail.is_none(), "tail should be gone after the fade window");
        assert!(voice.head.is_some());
    }

    #[test]
    fn makeup_gain_override() {
        let settings = SampledSettings {
            makeup_gain: Some(3.0),
            ..Default::default()
        }
        .validated();
        let voice = SampledVoice::new(DrumCategory::Clap, &settings, SR, 1.5);
        assert_eq!(voice.makeup_gain(), 3.0);

        let voice = SampledVoice::new(DrumCategory::Clap, &SampledSettings::default(), SR, 1.5);
        assert_eq!(voice.makeup_gain(), 1.5);
    }

    #[test]
    fn dc_blocker_removes_offset() {
        let bank = bank_with(vec![0.5; 100_000]);
        let settings = SampledSettings {
            attack: 0.0,
            decay: 30.0,
            sustain: 1.0,
            ..Default::default()
        };
        let mut voice = SampledVoice::new(DrumCategory::Kick, &settings, SR, 1.0);
        voice.trigger(1.0, 60, &bank);
        let mut last = 0.0;
        for _ in 0..10_000 {
            last = voice.next_sample();
        }
        assert!(last.abs() < 1e-3, "constant input should settle to zero, got {last}");
    }
}
