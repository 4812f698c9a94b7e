//! Control-plane wire format.
//!
//! Messages arrive as JSON or as plain JS objects, tagged by a `type` field
//! with camelCase names:
//!
//! ```json
//! { "type": "setTempo", "bpm": 96 }
//! { "type": "updateTrackVolume", "trackId": "kick", "value": 0.8 }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::automation::{AutomationPoint, AutomationTarget};
use crate::engine::playback::TransportState;
use crate::pattern::{AudioEvent, PatternNode};

fn default_bpm() -> f64 {
    120.0
}

fn default_base_meter() -> f64 {
    4.0
}

fn default_volume() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// One instrument track as the control plane describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDescriptor {
    pub id: String,
    /// Instrument type tag (`kick`, `synth`, `sampled-snare`, ...).
    #[serde(rename = "type", alias = "instrument")]
    pub instrument: String,
    #[serde(default, alias = "tree", skip_serializing_if = "Option::is_none")]
    pub pattern: Option<PatternNode>,
    /// Pattern length in beats.
    #[serde(default = "default_base_meter")]
    pub base_meter: f64,
    #[serde(default)]
    pub settings: Value,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub pan: f64,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
    /// Cosmetic; carried for round trips and ignored by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Insert effects applied to this track, in order.
    #[serde(default)]
    pub effect_ids: Vec<String>,
    /// Timeline track whose effects and envelopes also apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline_track_id: Option<String>,
}

impl TrackDescriptor {
    pub fn new(id: &str, instrument: &str) -> Self {
        TrackDescriptor {
            id: id.to_string(),
            instrument: instrument.to_string(),
            pattern: None,
            base_meter: default_base_meter(),
            settings: Value::Null,
            volume: default_volume(),
            pan: 0.0,
            mute: false,
            solo: false,
            color: None,
            effect_ids: Vec::new(),
            timeline_track_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub effect_type: String,
    #[serde(default)]
    pub settings: Value,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeDescriptor {
    pub id: String,
    pub target: AutomationTarget,
    #[serde(default)]
    pub points: Vec<AutomationPoint>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Envelope edits; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvelopePatch {
    pub target: Option<AutomationTarget>,
    pub points: Option<Vec<AutomationPoint>>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineTrackDescriptor {
    pub id: String,
    #[serde(default)]
    pub effect_ids: Vec<String>,
    #[serde(default)]
    pub envelope_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimelineDescriptor {
    pub tracks: Vec<TimelineTrackDescriptor>,
}

/// A whole project, replacing everything the engine currently holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectDescriptor {
    pub tracks: Vec<TrackDescriptor>,
    pub bpm: f64,
    /// Pre-flattened events; each is routed to the track named by its
    /// `instrumentId` and plays once per loop.
    pub events: Vec<AudioEvent>,
    pub timeline: Option<TimelineDescriptor>,
    pub effects: Vec<EffectDescriptor>,
    pub envelopes: Vec<EnvelopeDescriptor>,
    /// Pattern clip id → timeline track id.
    pub pattern_to_track_id: HashMap<String, String>,
    /// Loop length; derived from the content when absent.
    pub loop_length_beats: Option<f64>,
}

impl Default for ProjectDescriptor {
    fn default() -> Self {
        ProjectDescriptor {
            tracks: Vec::new(),
            bpm: default_bpm(),
            events: Vec::new(),
            timeline: None,
            effects: Vec::new(),
            envelopes: Vec::new(),
            pattern_to_track_id: HashMap::new(),
            loop_length_beats: None,
        }
    }
}

/// Messages from the control plane to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ControlMessage {
    LoadProject(ProjectDescriptor),
    SetTransport {
        state: TransportState,
        #[serde(default)]
        position_beats: f64,
    },
    SetTempo {
        bpm: f64,
    },
    UpdatePatternTree {
        track_id: String,
        tree: PatternNode,
        #[serde(default = "default_base_meter")]
        base_meter: f64,
    },
    UpdateTrackSettings {
        track_id: String,
        settings: Value,
    },
    UpdateTrackVolume {
        track_id: String,
        value: f64,
    },
    UpdateTrackPan {
        track_id: String,
        value: f64,
    },
    UpdateTrackMute {
        track_id: String,
        value: bool,
    },
    UpdateTrackSolo {
        track_id: String,
        value: bool,
    },
    /// Replace a track wholesale, or add it when the id is new.
    UpdateTrack {
        track_id: String,
        track: TrackDescriptor,
    },
    AddTrack {
        track: TrackDescriptor,
    },
    UpdateTrackEvents {
        track_id: String,
        events: Vec<AudioEvent>,
    },
    RemoveTrack {
        track_id: String,
    },
    /// Change effect settings. With `effectType`, also (re)creates the effect.
    UpdateEffect {
        effect_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        effect_type: Option<String>,
        #[serde(default)]
        settings: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        enabled: Option<bool>,
    },
    UpdateEnvelope {
        envelope_id: String,
        settings: EnvelopePatch,
    },
    RegisterWavetable {
        category: String,
        name: String,
        data: Vec<f32>,
    },
}

/// Playhead report sent back to the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "playbackPosition", rename_all = "camelCase")]
pub struct PlaybackPosition {
    pub time_in_beats: f64,
    /// Ids of the pattern leaves whose notes are still sounding.
    pub active_event_ids: Vec<String>,
}
