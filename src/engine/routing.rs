//! Control-side mirror of the audio routes.
//!
//! Effect state owns delay lines and comb buffers, too large to allocate in
//! the audio callback. The planner tracks which effect slots the audio side's
//! routes will hold after each command and builds the missing states here.
//! They cross the queue as a [`Command::StockEffects`] ahead of the command
//! that needs them. States the audio side lets go come back on the return
//! channel and are dropped on this side.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dsp::effects::{EffectKind, EffectSettings, EffectState};
use crate::engine::command::{Command, ProjectPlan, TrackSpec};
use crate::engine::scheduler::{SequencedNote, TrackSequence};

/// One effect instance on one route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub track: String,
    pub lane: Option<String>,
    pub effect: String,
    pub kind: EffectKind,
}

impl SlotKey {
    pub fn matches(&self, track: &str, lane: Option<&str>, effect: &str, kind: EffectKind) -> bool {
        self.kind == kind && self.track == track && self.effect == effect && self.lane.as_deref() == lane
    }
}

/// A freshly built effect state waiting for its route.
#[derive(Debug, Clone)]
pub struct StockedState {
    pub slot: SlotKey,
    pub state: EffectState,
}

#[derive(Debug, Clone, Default)]
struct TrackRouting {
    effect_ids: Vec<String>,
    timeline_track_id: Option<String>,
    pattern_clips: Vec<Option<Arc<str>>>,
    event_clips: Vec<Option<Arc<str>>>,
}

fn clips(notes: &[SequencedNote]) -> Vec<Option<Arc<str>>> {
    let mut ids: Vec<_> = notes.iter().map(|n| n.pattern_id.clone()).collect();
    ids.sort();
    ids.dedup();
    ids
}

impl TrackRouting {
    fn from_spec(spec: &TrackSpec) -> Self {
        TrackRouting {
            effect_ids: spec.effect_ids.clone(),
            timeline_track_id: spec.timeline_track_id.clone(),
            pattern_clips: clips(spec.sequence.pattern_notes()),
            event_clips: clips(spec.sequence.event_notes()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoutePlanner {
    sample_rate: f64,
    tracks: HashMap<String, TrackRouting>,
    effects: HashMap<String, Option<EffectKind>>,
    /// Lane id → lane effect ids.
    lanes: HashMap<String, Vec<String>>,
    pattern_to_lane: HashMap<String, String>,
    /// Slots currently held by the audio side's routes, with multiplicity.
    slots: HashMap<SlotKey, usize>,
}

impl RoutePlanner {
    pub fn new(sample_rate: f64) -> Self {
        RoutePlanner {
            sample_rate,
            tracks: HashMap::new(),
            effects: HashMap::new(),
            lanes: HashMap::new(),
            pattern_to_lane: HashMap::new(),
            slots: HashMap::new(),
        }
    }

    /// Number of effect slots across all routes.
    pub fn slot_count(&self) -> usize {
        self.slots.values().sum()
    }

    /// Follow `command` and build the effect states its route rebuild will
    /// need. Empty when the command leaves the routes alone.
    pub fn observe(&mut self, command: &Command) -> Vec<StockedState> {
        match command {
            Command::LoadProject(plan) => {
                self.load(plan);
                // Nothing survives a reload on the audio side.
                self.slots.clear();
            }
            Command::UpsertTrack(spec) => match self.tracks.get_mut(&spec.id) {
                Some(track) => {
                    // The audio side keeps an existing track's events.
                    let event_clips = std::mem::take(&mut track.event_clips);
                    *track = TrackRouting {
                        event_clips,
                        ..TrackRouting::from_spec(spec)
                    };
                }
                None => {
                    self.tracks.insert(spec.id.clone(), TrackRouting::from_spec(spec));
                }
            },
            Command::RemoveTrack(id) => {
                self.tracks.remove(id);
            }
            Command::SetTrackPattern {
                track_id,
                events,
                base_meter,
            } => {
                let Some(track) = self.tracks.get_mut(track_id) else {
                    return Vec::new();
                };
                let mut seq = TrackSequence::new();
                seq.set_pattern(events, *base_meter);
                track.pattern_clips = clips(seq.pattern_notes());
            }
            Command::SetTrackEvents { track_id, events } => {
                let Some(track) = self.tracks.get_mut(track_id) else {
                    return Vec::new();
                };
                let mut seq = TrackSequence::new();
                seq.set_events(events);
                track.event_clips = clips(seq.event_notes());
            }
            Command::ReplaceEffect(spec) => {
                let kind = spec.settings.as_ref().map(EffectSettings::kind);
                self.effects.insert(spec.id.clone(), kind);
            }
            _ => return Vec::new(),
        }
        self.restock()
    }

    fn load(&mut self, plan: &ProjectPlan) {
        self.tracks = plan
            .tracks
            .iter()
            .map(|t| (t.id.clone(), TrackRouting::from_spec(t)))
            .collect();
        self.effects = plan
            .effects
            .iter()
            .map(|e| (e.id.clone(), e.settings.as_ref().map(EffectSettings::kind)))
            .collect();
        self.lanes = plan
            .lanes
            .iter()
            .map(|l| (l.id.clone(), l.effect_ids.clone()))
            .collect();
        self.pattern_to_lane = plan.pattern_to_lane.clone();
    }

    fn lane_of(&self, clip: Option<&str>) -> Option<&str> {
        let lane = self.pattern_to_lane.get(clip?)?;
        self.lanes.contains_key(lane).then_some(lane.as_str())
    }

    /// Slot multiset the audio side will hold for the current topology.
    fn plan(&self) -> HashMap<SlotKey, usize> {
        let mut slots = HashMap::new();
        for (track_id, track) in &self.tracks {
            let default_lane = track
                .timeline_track_id
                .as_deref()
                .filter(|id| self.lanes.contains_key(*id));

            let mut lanes = vec![default_lane];
            for clip in track.pattern_clips.iter().chain(&track.event_clips) {
                lanes.push(self.lane_of(clip.as_deref()).or(default_lane));
            }
            lanes.sort();
            lanes.dedup();

            for lane in lanes {
                let lane_effects = lane
                    .and_then(|id| self.lanes.get(id))
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                for effect in track.effect_ids.iter().chain(lane_effects) {
                    let Some(Some(kind)) = self.effects.get(effect).copied() else {
                        continue;
                    };
                    let key = SlotKey {
                        track: track_id.clone(),
                        lane: lane.map(str::to_string),
                        effect: effect.clone(),
                        kind,
                    };
                    *slots.entry(key).or_insert(0) += 1;
                }
            }
        }
        slots
    }

    fn restock(&mut self) -> Vec<StockedState> {
        let planned = self.plan();
        let mut stock = Vec::new();
        for (slot, &count) in &planned {
            let held = self.slots.get(slot).copied().unwrap_or(0);
            for _ in held..count {
                stock.push(StockedState {
                    slot: slot.clone(),
                    state: EffectState::new(slot.kind, self.sample_rate),
                });
            }
        }
        self.slots = planned;
        stock
    }
}
