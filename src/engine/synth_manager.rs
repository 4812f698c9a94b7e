//! One live voice per track, created on first use.
//!
//! When a track switches instrument, its voice is replaced at once and the
//! old one moves to a short retiring list where it keeps rendering until its
//! envelope finishes, so a decaying note is never hard-cut.

use std::sync::Arc;

use log::debug;

use crate::arena::{Handle, SecondaryMap};
use crate::dsp::synth::{InstrumentSettings, Voice};
use crate::dsp::wavetable::WavetableBank;

/// Most voices allowed to ring out after an instrument change.
pub const RETIRING_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
struct SynthSlot {
    voice: Voice,
    route: usize,
    /// Id of the pattern leaf that last triggered this voice.
    event_id: Option<Arc<str>>,
}

#[derive(Debug, Clone)]
struct RetiringVoice {
    track: Handle,
    voice: Voice,
    route: usize,
}

#[derive(Debug, Clone)]
pub struct SynthManager {
    sample_rate: f64,
    makeup_gain: f64,
    slots: SecondaryMap<SynthSlot>,
    retiring: Vec<RetiringVoice>,
    bank: WavetableBank,
}

impl SynthManager {
    pub fn new(sample_rate: f64, makeup_gain: f64) -> Self {
        SynthManager {
            sample_rate,
            makeup_gain,
            slots: SecondaryMap::new(),
            retiring: Vec::with_capacity(RETIRING_CAPACITY),
            bank: WavetableBank::new(),
        }
    }

    pub fn bank(&self) -> &WavetableBank {
        &self.bank
    }

    pub fn set_bank(&mut self, bank: WavetableBank) {
        self.bank = bank;
    }

    pub fn bank_mut(&mut self) -> &mut WavetableBank {
        &mut self.bank
    }

    /// The track's voice, built from `settings` if it has none yet or if it
    /// currently plays a different instrument.
    pub fn get_or_create_synth(
        &mut self,
        track: Handle,
        settings: &InstrumentSettings,
        seed: u64,
    ) -> Option<&mut Voice> {
        match self.slots.get(track) {
            Some(slot) if slot.voice.kind() == settings.kind() => {}
            Some(slot) => {
                let route = slot.route;
                self.retire(track);
                self.install(track, settings, seed, route);
            }
            None => self.install(track, settings, seed, 0),
        }
        self.slots.get_mut(track).map(|slot| &mut slot.voice)
    }

    fn install(&mut self, track: Handle, settings: &InstrumentSettings, seed: u64, route: usize) {
        let voice = Voice::new(settings, self.sample_rate, self.makeup_gain, seed);
        self.slots.insert(
            track,
            SynthSlot {
                voice,
                route,
                event_id: None,
            },
        );
    }

    /// Start a note on the track's voice, creating it if needed.
    #[allow(clippy::too_many_arguments)]
    pub fn trigger_note(
        &mut self,
        track: Handle,
        settings: &InstrumentSettings,
        seed: u64,
        velocity: f64,
        pitch: u8,
        route: usize,
        event_id: Arc<str>,
    ) {
        self.get_or_create_synth(track, settings, seed);
        let bank = &self.bank;
        if let Some(slot) = self.slots.get_mut(track) {
            slot.voice.trigger(velocity, pitch, bank);
            slot.route = route;
            slot.event_id = Some(event_id);
        }
    }

    /// Apply new settings to the track's voice; a different instrument
    /// retires the old voice and builds a new one.
    pub fn update_synth_settings(&mut self, track: Handle, settings: &InstrumentSettings, seed: u64) {
        let Some(slot) = self.slots.get_mut(track) else {
            return;
        };
        if !slot.voice.update_settings(settings) {
            debug!(target: "treeseq::synth", "instrument changed to {:?}, replacing voice", settings.kind());
            let route = slot.route;
            self.retire(track);
            self.install(track, settings, seed, route);
        }
    }

    /// Move the track's voice to the retiring list.
    pub fn retire(&mut self, track: Handle) {
        let Some(slot) = self.slots.remove(track) else {
            return;
        };
        if !slot.voice.is_active() {
            return;
        }
        if self.retiring.len() >= RETIRING_CAPACITY {
            self.retiring.remove(0);
        }
        self.retiring.push(RetiringVoice {
            track,
            voice: slot.voice,
            route: slot.route,
        });
    }

    /// Drop the track's live and retiring voices immediately.
    pub fn remove_synth(&mut self, track: Handle) {
        self.slots.remove(track);
        self.retiring.retain(|r| r.track != track);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.retiring.clear();
    }

    pub fn has_synth(&self, track: Handle) -> bool {
        self.slots.get(track).is_some()
    }

    pub fn voice(&self, track: Handle) -> Option<&Voice> {
        self.slots.get(track).map(|s| &s.voice)
    }

    pub fn retiring_count(&self) -> usize {
        self.retiring.len()
    }

    /// Render one sample of every voice, adding each into its route's slot.
    #[inline]
    pub fn render(&mut self, routes: &mut [f64]) {
        for slot in self.slots.values_mut() {
            let s = slot.voice.next_sample();
            if let Some(acc) = routes.get_mut(slot.route) {
                *acc += s;
            }
        }
        for r in &mut self.retiring {
            let s = r.voice.next_sample();
            if let Some(acc) = routes.get_mut(r.route) {
                *acc += s;
            }
        }
    }

    /// Drop retiring voices that have finished. Call once per block.
    pub fn prune(&mut self) {
        self.retiring.retain(|r| r.voice.is_active());
    }

    /// Point voices at new route indices after a route rebuild.
    pub fn remap_routes(&mut self, remap: &[usize]) {
        for slot in self.slots.values_mut() {
            if let Some(&route) = remap.get(slot.route) {
                slot.route = route;
            }
        }
        for r in &mut self.retiring {
            if let Some(&route) = remap.get(r.route) {
                r.route = route;
            }
        }
    }

    /// Collect the event ids of voices that are still sounding.
    pub fn active_event_ids(&self, out: &mut Vec<String>) {
        for slot in self.slots.values() {
            if let Some(id) = &slot.event_id {
                if slot.voice.is_active() && !id.is_empty() {
                    out.push(id.to_string());
                }
            }
        }
    }
}
