//! Tempo, transport and the sample clock.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

pub const DEFAULT_BPM: f64 = 120.0;
pub const MIN_BPM: f64 = 1.0;
pub const MAX_BPM: f64 = 999.0;

/// Reject tempos that are not finite and positive; clamp the rest.
pub fn validate_bpm(bpm: f64) -> Result<f64, EngineError> {
    if bpm.is_finite() && bpm > 0.0 {
        Ok(bpm.clamp(MIN_BPM, MAX_BPM))
    } else {
        Err(EngineError::InvalidTempo(bpm))
    }
}

#[derive(Debug, Clone)]
pub struct PlaybackController {
    sample_rate: f64,
    bpm: f64,
    samples_per_beat: f64,
    state: TransportState,
    /// Samples since beat zero of the current loop pass.
    current_sample: u64,
}

impl PlaybackController {
    pub fn new(sample_rate: f64) -> Self {
        PlaybackController {
            sample_rate,
            bpm: DEFAULT_BPM,
            samples_per_beat: sample_rate * 60.0 / DEFAULT_BPM,
            state: TransportState::Stopped,
            current_sample: 0,
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn samples_per_beat(&self) -> f64 {
        self.samples_per_beat
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn current_sample(&self) -> u64 {
        self.current_sample
    }

    pub fn current_beat(&self) -> f64 {
        self.current_sample as f64 / self.samples_per_beat
    }

    /// Sample time of `beat` at the current tempo.
    pub fn beat_to_sample(&self, beat: f64) -> u64 {
        (beat.max(0.0) * self.samples_per_beat).round() as u64
    }

    pub fn seconds_to_beats(&self, seconds: f64) -> f64 {
        seconds * self.sample_rate / self.samples_per_beat
    }

    pub fn set_transport(&mut self, state: TransportState, position_beats: f64) {
        let position = if position_beats.is_finite() {
            position_beats.max(0.0)
        } else {
            0.0
        };
        self.state = state;
        self.current_sample = self.beat_to_sample(position);
        debug!(target: "treeseq::processor", "transport {state:?} at beat {position}");
    }

    /// Change tempo in place. The beat position is preserved; returns it.
    pub fn set_tempo(&mut self, bpm: f64) -> f64 {
        let beat = self.current_beat();
        self.bpm = bpm;
        self.samples_per_beat = self.sample_rate * 60.0 / bpm;
        self.current_sample = self.beat_to_sample(beat);
        debug!(target: "treeseq::processor", "tempo {bpm} bpm at beat {beat}");
        beat
    }

    #[inline]
    pub fn advance(&mut self) {
        self.current_sample += 1;
    }

    /// Jump back to beat zero (loop wrap).
    pub fn rewind(&mut self) {
        self.current_sample = 0;
    }
}
