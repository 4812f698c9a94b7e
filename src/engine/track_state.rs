//! Per-track mix parameters and the solo/mute audibility rule.

use crate::arena::{Handle, SecondaryMap};
use crate::settings::clamp_or;

/// Upper bound for track volume. Keeps a bad UI value from blowing up the bus.
pub const MAX_TRACK_VOLUME: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackMix {
    /// Linear gain [0, 4]. Default 1.
    pub volume: f64,
    /// Stereo position [-1, 1]. Default 0.
    pub pan: f64,
    pub mute: bool,
    pub solo: bool,
}

impl Default for TrackMix {
    fn default() -> Self {
        TrackMix {
            volume: 1.0,
            pan: 0.0,
            mute: false,
            solo: false,
        }
    }
}

impl TrackMix {
    pub fn new(volume: f64, pan: f64, mute: bool, solo: bool) -> Self {
        TrackMix {
            volume: clamp_volume(volume),
            pan: clamp_pan(pan),
            mute,
            solo,
        }
    }
}

pub fn clamp_volume(volume: f64) -> f64 {
    clamp_or(volume, 0.0, MAX_TRACK_VOLUME, 1.0)
}

pub fn clamp_pan(pan: f64) -> f64 {
    clamp_or(pan, -1.0, 1.0, 0.0)
}

/// Mix state of every track, keyed by track handle.
#[derive(Debug, Clone, Default)]
pub struct TrackStateManager {
    mixes: SecondaryMap<TrackMix>,
}

impl TrackStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, track: Handle, mix: TrackMix) {
        self.mixes.insert(track, mix);
    }

    pub fn remove(&mut self, track: Handle) {
        self.mixes.remove(track);
    }

    pub fn clear(&mut self) {
        self.mixes.clear();
    }

    pub fn get(&self, track: Handle) -> Option<&TrackMix> {
        self.mixes.get(track)
    }

    pub fn set_volume(&mut self, track: Handle, volume: f64) -> bool {
        self.update(track, |m| m.volume = clamp_volume(volume))
    }

    pub fn set_pan(&mut self, track: Handle, pan: f64) -> bool {
        self.update(track, |m| m.pan = clamp_pan(pan))
    }

    pub fn set_mute(&mut self, track: Handle, mute: bool) -> bool {
        self.update(track, |m| m.mute = mute)
    }

    pub fn set_solo(&mut self, track: Handle, solo: bool) -> bool {
        self.update(track, |m| m.solo = solo)
    }

    fn update(&mut self, track: Handle, f: impl FnOnce(&mut TrackMix)) -> bool {
        match self.mixes.get_mut(track) {
            Some(mix) => {
                f(mix);
                true
            }
            None => false,
        }
    }

    /// Whether any track is soloed. Call once per mixing pass.
    pub fn any_solo(&self) -> bool {
        self.mixes.values().any(|m| m.solo)
    }

    /// Audible iff (nothing is soloed or this track is) and it is not muted.
    pub fn is_audible(&self, track: Handle, any_solo: bool) -> bool {
        match self.mixes.get(track) {
            Some(mix) => (!any_solo || mix.solo) && !mix.mute,
            None => false,
        }
    }
}
