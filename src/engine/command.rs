//! Validated commands for the audio side.
//!
//! Wire messages are decoded, checked and flattened here, on the control
//! plane. What crosses the queue is a [`Command`] that the audio side can
//! apply without parsing anything.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use crate::dsp::effects::{EffectKind, EffectSettings};
use crate::dsp::synth::{InstrumentKind, InstrumentSettings};
use crate::dsp::wavetable::{DrumCategory, WavetableBank};
use crate::engine::automation::{AutomationEnvelope, AutomationPoint, AutomationTarget};
use crate::engine::playback::{TransportState, validate_bpm};
use crate::engine::routing::{RoutePlanner, StockedState};
use crate::engine::scheduler::TrackSequence;
use crate::engine::track_state::TrackMix;
use crate::error::EngineError;
use crate::messages::{
    ControlMessage, EffectDescriptor, EnvelopePatch, ProjectDescriptor, TrackDescriptor,
};
use crate::pattern::{AudioEvent, flatten};

// ── Commands ────────────────────────────────────────────────

/// A fully decoded instrument track.
#[derive(Debug, Clone)]
pub struct TrackSpec {
    pub id: String,
    /// `None` for an unknown instrument tag; the track stays silent.
    pub settings: Option<InstrumentSettings>,
    pub mix: TrackMix,
    pub sequence: TrackSequence,
    pub effect_ids: Vec<String>,
    pub timeline_track_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EffectSpec {
    pub id: String,
    /// `None` for an unknown effect tag; the effect passes audio through.
    pub settings: Option<EffectSettings>,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct EnvelopeSpec {
    pub id: String,
    pub envelope: AutomationEnvelope,
}

#[derive(Debug, Clone)]
pub struct LaneSpec {
    pub id: String,
    pub effect_ids: Vec<String>,
    pub envelope_ids: Vec<String>,
}

/// Everything needed to replace the engine's project in one step.
#[derive(Debug, Clone)]
pub struct ProjectPlan {
    pub bpm: f64,
    pub tracks: Vec<TrackSpec>,
    pub effects: Vec<EffectSpec>,
    pub envelopes: Vec<EnvelopeSpec>,
    pub lanes: Vec<LaneSpec>,
    pub pattern_to_lane: HashMap<String, String>,
    pub loop_length_beats: Option<f64>,
}

#[derive(Debug, Clone)]
pub enum Command {
    LoadProject(Box<ProjectPlan>),
    SetTransport {
        state: TransportState,
        position_beats: f64,
    },
    SetTempo(f64),
    /// Add a track, or replace the one with the same id.
    UpsertTrack(Box<TrackSpec>),
    RemoveTrack(String),
    SetTrackPattern {
        track_id: String,
        events: Vec<AudioEvent>,
        base_meter: f64,
    },
    SetTrackEvents {
        track_id: String,
        events: Vec<AudioEvent>,
    },
    SetTrackSettings {
        track_id: String,
        settings: InstrumentSettings,
    },
    SetTrackVolume(String, f64),
    SetTrackPan(String, f64),
    SetTrackMute(String, bool),
    SetTrackSolo(String, bool),
    /// Create an effect or replace its type.
    ReplaceEffect(EffectSpec),
    UpdateEffect {
        effect_id: String,
        settings: Option<EffectSettings>,
        enabled: Option<bool>,
    },
    UpdateEnvelope {
        envelope_id: String,
        patch: EnvelopePatch,
    },
    /// Replace the whole wavetable bank.
    SetWavetables(WavetableBank),
    /// Merge samples into the bank.
    AddWavetables(WavetableBank),
    /// Effect states built on the control side for the next route rebuild.
    StockEffects(Vec<StockedState>),
}

// ── Translation ─────────────────────────────────────────────

fn track_target(id: &str) -> String {
    format!("track '{id}'")
}

fn effect_target(id: &str) -> String {
    format!("effect '{id}'")
}

/// Decode a track descriptor. `id` overrides the descriptor's own id.
pub fn track_spec(id: &str, desc: &TrackDescriptor) -> Result<TrackSpec, EngineError> {
    let settings = match InstrumentKind::from_tag(&desc.instrument) {
        Some(kind) => Some(InstrumentSettings::parse(kind, &track_target(id), &desc.settings)?),
        None => {
            warn!(target: "treeseq::project", "track '{id}' has unknown instrument '{}'", desc.instrument);
            None
        }
    };
    let mut sequence = TrackSequence::new();
    if let Some(root) = &desc.pattern {
        sequence.set_pattern(&flatten(root, desc.base_meter, id), desc.base_meter);
    }
    Ok(TrackSpec {
        id: id.to_string(),
        settings,
        mix: TrackMix::new(desc.volume, desc.pan, desc.mute, desc.solo),
        sequence,
        effect_ids: desc.effect_ids.clone(),
        timeline_track_id: desc.timeline_track_id.clone(),
    })
}

pub fn effect_spec(desc: &EffectDescriptor) -> Result<EffectSpec, EngineError> {
    let settings = match EffectKind::from_tag(&desc.effect_type) {
        Some(kind) => Some(EffectSettings::parse(kind, &effect_target(&desc.id), &desc.settings)?),
        None => {
            warn!(target: "treeseq::project", "effect '{}' has unknown type '{}', passing through", desc.id, desc.effect_type);
            None
        }
    };
    Ok(EffectSpec {
        id: desc.id.clone(),
        settings,
        enabled: desc.enabled,
    })
}

fn validate_loop_length(beats: Option<f64>) -> Option<f64> {
    beats.filter(|b| {
        let ok = b.is_finite() && *b > 0.0;
        if !ok {
            warn!(target: "treeseq::project", "ignoring loop length {b}");
        }
        ok
    })
}

pub fn project_plan(desc: &ProjectDescriptor) -> Result<ProjectPlan, EngineError> {
    let bpm = validate_bpm(desc.bpm)?;

    let mut seen = HashSet::new();
    let mut tracks = Vec::with_capacity(desc.tracks.len());
    for track in &desc.tracks {
        if !seen.insert(track.id.as_str()) {
            return Err(EngineError::DuplicateTrack(track.id.clone()));
        }
        tracks.push(track_spec(&track.id, track)?);
    }

    let mut by_track: HashMap<&str, Vec<AudioEvent>> = HashMap::new();
    for event in &desc.events {
        by_track
            .entry(event.instrument_id.as_str())
            .or_default()
            .push(event.clone());
    }
    for track in &mut tracks {
        if let Some(events) = by_track.remove(track.id.as_str()) {
            track.sequence.set_events(&events);
        }
    }
    for orphan in by_track.keys() {
        warn!(target: "treeseq::project", "events reference unknown track '{orphan}'");
    }

    let effects = desc
        .effects
        .iter()
        .map(effect_spec)
        .collect::<Result<Vec<_>, _>>()?;

    let envelopes = desc
        .envelopes
        .iter()
        .map(|e| EnvelopeSpec {
            id: e.id.clone(),
            envelope: AutomationEnvelope::new(e.target, e.points.clone(), e.enabled),
        })
        .collect();

    let lanes = desc
        .timeline
        .iter()
        .flat_map(|t| &t.tracks)
        .map(|t| LaneSpec {
            id: t.id.clone(),
            effect_ids: t.effect_ids.clone(),
            envelope_ids: t.envelope_ids.clone(),
        })
        .collect();

    Ok(ProjectPlan {
        bpm,
        tracks,
        effects,
        envelopes,
        lanes,
        pattern_to_lane: desc.pattern_to_track_id.clone(),
        loop_length_beats: validate_loop_length(desc.loop_length_beats),
    })
}

fn sorted_points(mut points: Vec<AutomationPoint>) -> Vec<AutomationPoint> {
    points.retain(|p| p.beat.is_finite() && p.value.is_finite());
    points.sort_by(|a, b| a.beat.total_cmp(&b.beat));
    points
}

/// Turns wire messages into commands.
///
/// Keeps a mirror of each track's instrument and each effect's type, so that
/// settings updates can be decoded before they reach the audio side, and of
/// the route topology, so that effect state is built here.
#[derive(Debug, Clone)]
pub struct CommandTranslator {
    tracks: HashMap<String, Option<InstrumentKind>>,
    effects: HashMap<String, Option<EffectKind>>,
    routing: RoutePlanner,
    stock: Vec<StockedState>,
}

impl CommandTranslator {
    pub fn new(sample_rate: f64) -> Self {
        CommandTranslator {
            tracks: HashMap::new(),
            effects: HashMap::new(),
            routing: RoutePlanner::new(sample_rate),
            stock: Vec::new(),
        }
    }

    /// Effect states built for the commands translated since the last call.
    /// They must reach the audio side before those commands do.
    pub fn take_stock(&mut self) -> Vec<StockedState> {
        std::mem::take(&mut self.stock)
    }

    pub fn has_track(&self, id: &str) -> bool {
        self.tracks.contains_key(id)
    }

    /// Translate one message. `Ok(None)` means the message was valid but
    /// refers to nothing the engine knows, and is dropped.
    pub fn translate(&mut self, msg: ControlMessage) -> Result<Option<Command>, EngineError> {
        let command = match msg {
            ControlMessage::LoadProject(desc) => {
                let plan = project_plan(&desc)?;
                self.tracks = plan
                    .tracks
                    .iter()
                    .map(|t| (t.id.clone(), t.settings.as_ref().map(InstrumentSettings::kind)))
                    .collect();
                self.effects = plan
                    .effects
                    .iter()
                    .map(|e| (e.id.clone(), e.settings.as_ref().map(EffectSettings::kind)))
                    .collect();
                debug!(target: "treeseq::project", "loading project: {} tracks at {} bpm", plan.tracks.len(), plan.bpm);
                Command::LoadProject(Box::new(plan))
            }
            ControlMessage::SetTransport {
                state,
                position_beats,
            } => Command::SetTransport {
                state,
                position_beats,
            },
            ControlMessage::SetTempo { bpm } => Command::SetTempo(validate_bpm(bpm)?),
            ControlMessage::UpdatePatternTree {
                track_id,
                tree,
                base_meter,
            } => {
                if !self.known_track(&track_id) {
                    return Ok(None);
                }
                let events = flatten(&tree, base_meter, &track_id);
                Command::SetTrackPattern {
                    track_id,
                    events,
                    base_meter,
                }
            }
            ControlMessage::UpdateTrackSettings { track_id, settings } => {
                let Some(kind) = self.tracks.get(&track_id).copied() else {
                    warn!(target: "treeseq::project", "settings for unknown track '{track_id}'");
                    return Ok(None);
                };
                let Some(kind) = kind else {
                    return Ok(None);
                };
                let settings = InstrumentSettings::parse(kind, &track_target(&track_id), &settings)?;
                Command::SetTrackSettings { track_id, settings }
            }
            ControlMessage::UpdateTrackVolume { track_id, value } => {
                if !self.known_track(&track_id) {
                    return Ok(None);
                }
                Command::SetTrackVolume(track_id, value)
            }
            ControlMessage::UpdateTrackPan { track_id, value } => {
                if !self.known_track(&track_id) {
                    return Ok(None);
                }
                Command::SetTrackPan(track_id, value)
            }
            ControlMessage::UpdateTrackMute { track_id, value } => {
                if !self.known_track(&track_id) {
                    return Ok(None);
                }
                Command::SetTrackMute(track_id, value)
            }
            ControlMessage::UpdateTrackSolo { track_id, value } => {
                if !self.known_track(&track_id) {
                    return Ok(None);
                }
                Command::SetTrackSolo(track_id, value)
            }
            ControlMessage::UpdateTrack { track_id, track } => {
                let spec = track_spec(&track_id, &track)?;
                self.tracks.insert(
                    track_id,
                    spec.settings.as_ref().map(InstrumentSettings::kind),
                );
                Command::UpsertTrack(Box::new(spec))
            }
            ControlMessage::AddTrack { track } => {
                if self.tracks.contains_key(&track.id) {
                    return Err(EngineError::DuplicateTrack(track.id));
                }
                let spec = track_spec(&track.id, &track)?;
                self.tracks.insert(
                    track.id,
                    spec.settings.as_ref().map(InstrumentSettings::kind),
                );
                Command::UpsertTrack(Box::new(spec))
            }
            ControlMessage::UpdateTrackEvents { track_id, events } => {
                if !self.known_track(&track_id) {
                    return Ok(None);
                }
                Command::SetTrackEvents { track_id, events }
            }
            ControlMessage::RemoveTrack { track_id } => {
                if self.tracks.remove(&track_id).is_none() {
                    warn!(target: "treeseq::project", "remove of unknown track '{track_id}'");
                    return Ok(None);
                }
                Command::RemoveTrack(track_id)
            }
            ControlMessage::UpdateEffect {
                effect_id,
                effect_type: Some(effect_type),
                settings,
                enabled,
            } => {
                let spec = effect_spec(&EffectDescriptor {
                    id: effect_id,
                    effect_type,
                    settings,
                    enabled: enabled.unwrap_or(true),
                })?;
                self.effects.insert(
                    spec.id.clone(),
                    spec.settings.as_ref().map(EffectSettings::kind),
                );
                Command::ReplaceEffect(spec)
            }
            ControlMessage::UpdateEffect {
                effect_id,
                effect_type: None,
                settings,
                enabled,
            } => {
                let Some(kind) = self.effects.get(&effect_id).copied() else {
                    warn!(target: "treeseq::project", "update for unknown effect '{effect_id}'");
                    return Ok(None);
                };
                let settings = match kind {
                    Some(kind) if !settings.is_null() => {
                        Some(EffectSettings::parse(kind, &effect_target(&effect_id), &settings)?)
                    }
                    _ => None,
                };
                Command::UpdateEffect {
                    effect_id,
                    settings,
                    enabled,
                }
            }
            ControlMessage::UpdateEnvelope {
                envelope_id,
                mut settings,
            } => {
                settings.points = settings.points.map(sorted_points);
                Command::UpdateEnvelope {
                    envelope_id,
                    patch: settings,
                }
            }
            ControlMessage::RegisterWavetable {
                category,
                name,
                data,
            } => {
                let category = DrumCategory::from_tag(&category).ok_or_else(|| {
                    EngineError::InvalidMessage(format!("unknown drum category '{category}'"))
                })?;
                let mut bank = WavetableBank::new();
                bank.insert(category, &name, data);
                Command::AddWavetables(bank)
            }
        };
        self.stock.extend(self.routing.observe(&command));
        Ok(Some(command))
    }

    fn known_track(&self, id: &str) -> bool {
        let known = self.tracks.contains_key(id);
        if !known {
            warn!(target: "treeseq::project", "message for unknown track '{id}'");
        }
        known
    }
}

/// Build an envelope from a patch when nothing exists yet under its id.
pub fn envelope_from_patch(patch: &EnvelopePatch) -> Option<AutomationEnvelope> {
    let target: AutomationTarget = patch.target?;
    Some(AutomationEnvelope::new(
        target,
        patch.points.clone().unwrap_or_default(),
        patch.enabled.unwrap_or(true),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::PatternNode;
    use serde_json::json;

    fn msg(value: serde_json::Value) -> ControlMessage {
        serde_json::from_value(value).unwrap()
    }

    fn loaded() -> CommandTranslator {
        let mut tr = CommandTranslator::new(44_100.0);
        tr.translate(msg(json!({
            "type": "loadProject",
            "bpm": 120,
            "tracks": [
                { "id": "kick", "type": "kick" },
                { "id": "odd", "type": "theremin" }
            ],
            "effects": [{ "id": "fx", "type": "delay" }]
        })))
        .unwrap();
        tr
    }

    #[test]
    fn effect_states_are_built_before_they_are_needed() {
        let mut tr = loaded();
        let stock = tr.take_stock();
        assert!(stock.is_empty(), "no track uses fx yet");

        let mut track = TrackDescriptor::new("lead", "synth");
        track.effect_ids = vec!["fx".to_string()];
        tr.translate(ControlMessage::AddTrack { track }).unwrap();
        let stock = tr.take_stock();
        assert_eq!(stock.len(), 1);
        assert_eq!(stock[0].state.kind(), EffectKind::Delay);
        assert!(tr.take_stock().is_empty());
    }

    #[test]
    fn project_with_duplicate_track_is_rejected() {
        let mut tr = CommandTranslator::new(44_100.0);
        let err = tr
            .translate(msg(json!({
                "type": "loadProject",
                "tracks": [{ "id": "a", "type": "kick" }, { "id": "a", "type": "snare" }]
            })))
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateTrack(id) if id == "a"));
    }

    #[test]
    fn invalid_tempo_is_rejected() {
        let mut tr = CommandTranslator::new(44_100.0);
        let err = tr.translate(ControlMessage::SetTempo { bpm: -1.0 }).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTempo(_)));
    }

    #[test]
    fn unknown_track_messages_are_dropped() {
        let mut tr = loaded();
        let out = tr
            .translate(ControlMessage::UpdateTrackVolume {
                track_id: "ghost".to_string(),
                value: 0.5,
            })
            .unwrap();
        assert!(out.is_none());
        let out = tr
            .translate(ControlMessage::RemoveTrack {
                track_id: "ghost".to_string(),
            })
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn settings_are_decoded_for_the_track_instrument() {
        let mut tr = loaded();
        let out = tr
            .translate(msg(json!({
                "type": "updateTrackSettings",
                "trackId": "kick",
                "settings": { "decay": 0.2 }
            })))
            .unwrap();
        let Some(Command::SetTrackSettings { settings, .. }) = out else {
            panic!("expected settings command");
        };
        assert_eq!(settings.kind(), InstrumentKind::Kick);

        let err = tr
            .translate(msg(json!({
                "type": "updateTrackSettings",
                "trackId": "kick",
                "settings": { "decay": "long" }
            })))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSettings { .. }));

        // Unknown instrument: nothing to decode into.
        let out = tr
            .translate(msg(json!({
                "type": "updateTrackSettings",
                "trackId": "odd",
                "settings": {}
            })))
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn pattern_tree_is_flattened_on_the_control_side() {
        let mut tr = loaded();
        let tree = PatternNode::group(
            "root",
            1.0,
            vec![PatternNode::leaf("a", 1.0, 1.0, 60), PatternNode::leaf("b", 1.0, 1.0, 60)],
        );
        let out = tr
            .translate(ControlMessage::UpdatePatternTree {
                track_id: "kick".to_string(),
                tree,
                base_meter: 4.0,
            })
            .unwrap();
        let Some(Command::SetTrackPattern { events, base_meter, .. }) = out else {
            panic!("expected pattern command");
        };
        assert_eq!(base_meter, 4.0);
        assert_eq!(events.iter().map(|e| e.time).collect::<Vec<_>>(), vec![0.0, 2.0]);
    }

    #[test]
    fn add_track_twice_fails() {
        let mut tr = loaded();
        let track = TrackDescriptor::new("kick", "snare");
        assert!(matches!(
            tr.translate(ControlMessage::AddTrack { track }),
            Err(EngineError::DuplicateTrack(_))
        ));
        let track = TrackDescriptor::new("snare", "snare");
        assert!(tr.translate(ControlMessage::AddTrack { track }).unwrap().is_some());
        assert!(tr.has_track("snare"));
    }

    #[test]
    fn effect_updates_use_the_known_type() {
        let mut tr = loaded();
        let out = tr
            .translate(msg(json!({
                "type": "updateEffect",
                "effectId": "fx",
                "settings": { "feedback": 0.5 }
            })))
            .unwrap();
        let Some(Command::UpdateEffect { settings: Some(s), .. }) = out else {
            panic!("expected effect update");
        };
        assert_eq!(s.kind(), EffectKind::Delay);

        let out = tr
            .translate(msg(json!({
                "type": "updateEffect",
                "effectId": "fx",
                "effectType": "reverb"
            })))
            .unwrap();
        assert!(matches!(out, Some(Command::ReplaceEffect(_))));

        let out = tr
            .translate(msg(json!({ "type": "updateEffect", "effectId": "nope", "settings": {} })))
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn project_events_are_grouped_by_track() {
        let plan = project_plan(
            &serde_json::from_value(json!({
                "tracks": [{ "id": "kick", "type": "kick" }],
                "events": [
                    { "time": 1.0, "instrumentId": "kick" },
                    { "time": 5.0, "instrumentId": "kick" },
                    { "time": 2.0, "instrumentId": "nobody" }
                ],
                "loopLengthBeats": -3
            }))
            .unwrap(),
        )
        .unwrap();
        assert_eq!(plan.tracks[0].sequence.end_beat(), 6.0);
        assert_eq!(plan.loop_length_beats, None);
    }

    #[test]
    fn wavetable_registration() {
        let mut tr = CommandTranslator::new(44_100.0);
        let out = tr
            .translate(ControlMessage::RegisterWavetable {
                category: "kick".to_string(),
                name: "808".to_string(),
                data: vec![0.5, 0.25],
            })
            .unwrap();
        let Some(Command::AddWavetables(bank)) = out else {
            panic!("expected wavetable command");
        };
        assert_eq!(bank.len(), 1);

        assert!(tr
            .translate(ControlMessage::RegisterWavetable {
                category: "cowbell".to_string(),
                name: "x".to_string(),
                data: vec![0.5],
            })
            .is_err());
    }

    #[test]
    fn envelope_patch_points_are_sorted() {
        let mut tr = CommandTranslator::new(44_100.0);
        let out = tr
            .translate(msg(json!({
                "type": "updateEnvelope",
                "envelopeId": "e",
                "settings": { "points": [{ "beat": 2, "value": 0 }, { "beat": 0, "value": 1 }] }
            })))
            .unwrap();
        let Some(Command::UpdateEnvelope { patch, .. }) = out else {
            panic!("expected envelope command");
        };
        assert_eq!(patch.points.unwrap()[0].beat, 0.0);
    }
}
