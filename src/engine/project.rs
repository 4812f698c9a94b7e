//! The engine's project: tracks, effects, envelopes and timeline lanes, the
//! routes built from them, and the block renderer that drives scheduling,
//! voices and mixing.
//!
//! All state lives here and is mutated only by [`ProjectManager::apply`]
//! between blocks and by [`ProjectManager::render`] during one.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace, warn};

use crate::arena::{Handle, Registry};
use crate::config::EngineConfig;
use crate::dsp::effects::{EffectKind, EffectSettings, EffectState};
use crate::dsp::synth::InstrumentSettings;
use crate::engine::automation::AutomationEnvelope;
use crate::engine::command::{Command, EffectSpec, ProjectPlan, TrackSpec, envelope_from_patch};
use crate::engine::mixer::{AudioMixer, MixContext};
use crate::engine::playback::{PlaybackController, TransportState};
use crate::engine::routing::StockedState;
use crate::engine::scheduler::{EventScheduler, ScheduledEvent, TrackSequence};
use crate::engine::synth_manager::SynthManager;
use crate::engine::track_state::TrackStateManager;
use crate::messages::{EnvelopePatch, PlaybackPosition};

/// Loop length when nothing in the project implies one.
pub const DEFAULT_LOOP_BEATS: f64 = 4.0;

// ── Entities ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Track {
    pub id: Arc<str>,
    /// `None` when the instrument tag was not recognised.
    pub settings: Option<InstrumentSettings>,
    pub sequence: TrackSequence,
    pub effect_ids: Vec<String>,
    pub timeline_track_id: Option<String>,
    /// Noise seed for this track's voices, derived from its id.
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct EffectEntry {
    /// `None` for an unknown effect type, which passes audio through.
    pub settings: Option<EffectSettings>,
    pub enabled: bool,
}

impl EffectEntry {
    fn kind(&self) -> Option<EffectKind> {
        self.settings.as_ref().map(EffectSettings::kind)
    }
}

/// A timeline track: effects and automation shared by the clips placed on it.
#[derive(Debug, Clone)]
pub struct Lane {
    pub id: String,
    pub effect_ids: Vec<String>,
    pub envelope_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ChainSlot {
    pub effect: Handle,
    pub state: EffectState,
}

/// Signal path for one instrument track on one timeline lane.
#[derive(Debug, Clone)]
pub struct Route {
    pub track: Handle,
    pub lane: Option<Handle>,
    /// Track effects, then lane effects.
    pub chain: Vec<ChainSlot>,
    /// Lane envelopes.
    pub automation: Vec<Handle>,
}

/// A note that was handed to a voice, for inspection and offline analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRecord {
    /// Frames rendered before the trigger.
    pub frame: u64,
    pub beat: f64,
    pub track_id: Arc<str>,
    pub event_id: Arc<str>,
    pub velocity: f64,
    pub pitch: u8,
}

/// FNV-1a; gives every track a stable noise seed.
fn seed_for(id: &str) -> u64 {
    id.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

// ── Route building ──────────────────────────────────────────

type RouteKey = (Handle, Option<Handle>);

struct RouteBuilder<'a> {
    sample_rate: f64,
    effects: &'a Registry<EffectEntry>,
    envelopes: &'a Registry<AutomationEnvelope>,
    lanes: &'a Registry<Lane>,
    old: Vec<Route>,
    /// States built on the control side for slots that are new.
    stock: Vec<StockedState>,
    /// States built here because the stock had none.
    allocated: u64,
    routes: Vec<Route>,
    index: HashMap<RouteKey, usize>,
}

impl RouteBuilder<'_> {
    fn intern(
        &mut self,
        track: Handle,
        track_id: &str,
        lane: Option<Handle>,
        track_effects: &[String],
    ) -> usize {
        if let Some(&i) = self.index.get(&(track, lane)) {
            return i;
        }
        let route = self.build(track, track_id, lane, track_effects);
        self.routes.push(route);
        let i = self.routes.len() - 1;
        self.index.insert((track, lane), i);
        i
    }

    fn build(
        &mut self,
        track: Handle,
        track_id: &str,
        lane: Option<Handle>,
        track_effects: &[String],
    ) -> Route {
        let (effects, envelopes, lanes) = (self.effects, self.envelopes, self.lanes);
        let lane_entry = lane.and_then(|h| lanes.get(h));
        let lane_id = lane_entry.map(|l| l.id.as_str());
        let lane_effects = lane_entry.map(|l| l.effect_ids.as_slice()).unwrap_or_default();

        let mut chain = Vec::new();
        for id in track_effects.iter().chain(lane_effects) {
            let Some(effect) = effects.handle_of(id) else {
                warn!(target: "treeseq::project", "chain references unknown effect '{id}'");
                continue;
            };
            let Some(kind) = effects.get(effect).and_then(EffectEntry::kind) else {
                continue;
            };
            let state = match self.reclaim(track, lane, effect, kind) {
                Some(state) => state,
                None => match self.take_stocked(track_id, lane_id, id, kind) {
                    Some(state) => state,
                    None => {
                        debug!(target: "treeseq::project", "no stocked state for '{id}' on '{track_id}', allocating");
                        self.allocated += 1;
                        EffectState::new(kind, self.sample_rate)
                    }
                },
            };
            chain.push(ChainSlot { effect, state });
        }

        let automation = lane_entry
            .map(|l| {
                l.envelope_ids
                    .iter()
                    .filter_map(|id| envelopes.handle_of(id))
                    .collect()
            })
            .unwrap_or_default();

        Route {
            track,
            lane,
            chain,
            automation,
        }
    }

    /// Take the running state of `effect` from the previous route with the
    /// same key, so delay tails and filter history survive a rebuild.
    fn reclaim(
        &mut self,
        track: Handle,
        lane: Option<Handle>,
        effect: Handle,
        kind: EffectKind,
    ) -> Option<EffectState> {
        let route = self
            .old
            .iter_mut()
            .find(|r| r.track == track && r.lane == lane)?;
        let pos = route
            .chain
            .iter()
            .position(|s| s.effect == effect && s.state.kind() == kind)?;
        Some(route.chain.swap_remove(pos).state)
    }

    fn take_stocked(
        &mut self,
        track_id: &str,
        lane_id: Option<&str>,
        effect_id: &str,
        kind: EffectKind,
    ) -> Option<EffectState> {
        let pos = self
            .stock
            .iter()
            .position(|s| s.slot.matches(track_id, lane_id, effect_id, kind))?;
        Some(self.stock.swap_remove(pos).state)
    }
}

// ── Project manager ─────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ProjectManager {
    config: EngineConfig,
    tracks: Registry<Track>,
    track_state: TrackStateManager,
    effects: Registry<EffectEntry>,
    envelopes: Registry<AutomationEnvelope>,
    lanes: Registry<Lane>,
    /// Pattern clip id → lane id.
    pattern_to_lane: HashMap<String, String>,
    routes: Vec<Route>,
    explicit_loop_length: Option<f64>,
    loop_length: f64,
    synths: SynthManager,
    scheduler: EventScheduler,
    playback: PlaybackController,
    mixer: AudioMixer,
    frames_rendered: u64,
    trigger_log: Option<Vec<TriggerRecord>>,
    /// Effect states waiting for the next route rebuild.
    stock: Vec<StockedState>,
    /// Effect states no route holds any more, to be dropped off this thread.
    retired: Vec<EffectState>,
    effect_allocations: u64,
}

impl ProjectManager {
    pub fn new(config: EngineConfig) -> Self {
        let config = config.validated();
        ProjectManager {
            tracks: Registry::new(),
            track_state: TrackStateManager::new(),
            effects: Registry::new(),
            envelopes: Registry::new(),
            lanes: Registry::new(),
            pattern_to_lane: HashMap::new(),
            routes: Vec::new(),
            explicit_loop_length: None,
            loop_length: DEFAULT_LOOP_BEATS,
            synths: SynthManager::new(config.sample_rate, config.wavetable_makeup_gain),
            scheduler: EventScheduler::new(),
            playback: PlaybackController::new(config.sample_rate),
            mixer: AudioMixer::new(config.master_gain),
            frames_rendered: 0,
            trigger_log: None,
            stock: Vec::new(),
            retired: Vec::new(),
            effect_allocations: 0,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn scheduler(&self) -> &EventScheduler {
        &self.scheduler
    }

    pub fn synths(&self) -> &SynthManager {
        &self.synths
    }

    pub fn track_state(&self) -> &TrackStateManager {
        &self.track_state
    }

    pub fn tracks(&self) -> &Registry<Track> {
        &self.tracks
    }

    pub fn effects(&self) -> &Registry<EffectEntry> {
        &self.effects
    }

    pub fn envelopes(&self) -> &Registry<AutomationEnvelope> {
        &self.envelopes
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn loop_length(&self) -> f64 {
        self.loop_length
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Effect states that had to be built during a route rebuild because
    /// none was stocked for them.
    pub fn effect_allocations(&self) -> u64 {
        self.effect_allocations
    }

    /// Hand over the effect states that left the routes.
    pub fn take_retired(&mut self) -> Vec<EffectState> {
        std::mem::take(&mut self.retired)
    }

    /// Start recording every trigger. Off by default.
    pub fn enable_trigger_log(&mut self) {
        self.trigger_log.get_or_insert_with(Vec::new);
    }

    pub fn take_triggers(&mut self) -> Vec<TriggerRecord> {
        self.trigger_log.as_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Current playhead and the leaves still sounding.
    pub fn position(&self) -> PlaybackPosition {
        let mut active_event_ids = Vec::new();
        self.synths.active_event_ids(&mut active_event_ids);
        PlaybackPosition {
            time_in_beats: self.playback.current_beat(),
            active_event_ids,
        }
    }

    // ── Commands ────────────────────────────────────────────

    /// Apply one command. Takes effect from the next rendered sample.
    pub fn apply(&mut self, command: Command) {
        match command {
            Command::LoadProject(plan) => self.load_project(*plan),
            Command::SetTransport {
                state,
                position_beats,
            } => {
                self.playback.set_transport(state, position_beats);
                self.scheduler.reset(self.schedule_origin());
            }
            Command::SetTempo(bpm) => {
                self.playback.set_tempo(bpm);
                self.scheduler.retime(self.playback.samples_per_beat());
            }
            Command::UpsertTrack(spec) => {
                let handle = self.upsert_track(*spec);
                self.rebuild_routes();
                self.refresh_loop_length();
                self.reseed_track(handle);
            }
            Command::RemoveTrack(id) => self.remove_track(&id),
            Command::SetTrackPattern {
                track_id,
                events,
                base_meter,
            } => self.edit_sequence(&track_id, |seq| seq.set_pattern(&events, base_meter)),
            Command::SetTrackEvents { track_id, events } => {
                self.edit_sequence(&track_id, |seq| seq.set_events(&events))
            }
            Command::SetTrackSettings { track_id, settings } => {
                let Some(handle) = self.tracks.handle_of(&track_id) else {
                    return;
                };
                if let Some(track) = self.tracks.get_mut(handle) {
                    self.synths.update_synth_settings(handle, &settings, track.seed);
                    track.settings = Some(settings);
                }
            }
            Command::SetTrackVolume(id, v) => {
                if let Some(h) = self.tracks.handle_of(&id) {
                    self.track_state.set_volume(h, v);
                }
            }
            Command::SetTrackPan(id, v) => {
                if let Some(h) = self.tracks.handle_of(&id) {
                    self.track_state.set_pan(h, v);
                }
            }
            Command::SetTrackMute(id, v) => {
                if let Some(h) = self.tracks.handle_of(&id) {
                    self.track_state.set_mute(h, v);
                }
            }
            Command::SetTrackSolo(id, v) => {
                if let Some(h) = self.tracks.handle_of(&id) {
                    self.track_state.set_solo(h, v);
                }
            }
            Command::ReplaceEffect(spec) => self.replace_effect(spec),
            Command::UpdateEffect {
                effect_id,
                settings,
                enabled,
            } => {
                let Some(entry) = self.effects.get_mut_by_id(&effect_id) else {
                    return;
                };
                if let Some(settings) = settings {
                    if entry.kind() == Some(settings.kind()) {
                        entry.settings = Some(settings);
                    }
                }
                if let Some(enabled) = enabled {
                    entry.enabled = enabled;
                }
            }
            Command::UpdateEnvelope { envelope_id, patch } => {
                self.update_envelope(&envelope_id, patch)
            }
            Command::SetWavetables(bank) => self.synths.set_bank(bank),
            Command::AddWavetables(bank) => self.synths.bank_mut().extend(bank),
            Command::StockEffects(states) => self.stock.extend(states),
        }
    }

    fn load_project(&mut self, plan: ProjectPlan) {
        self.tracks.clear();
        self.track_state.clear();
        self.effects.clear();
        self.envelopes.clear();
        self.lanes.clear();
        self.synths.clear();

        self.playback.set_tempo(plan.bpm);
        for e in plan.effects {
            self.effects.insert(
                &e.id,
                EffectEntry {
                    settings: e.settings,
                    enabled: e.enabled,
                },
            );
        }
        for e in plan.envelopes {
            self.envelopes.insert(&e.id, e.envelope);
        }
        for l in plan.lanes {
            self.lanes.insert(
                &l.id,
                Lane {
                    id: l.id.clone(),
                    effect_ids: l.effect_ids,
                    envelope_ids: l.envelope_ids,
                },
            );
        }
        self.pattern_to_lane = plan.pattern_to_lane;
        self.explicit_loop_length = plan.loop_length_beats;
        for spec in plan.tracks {
            self.upsert_track(spec);
        }

        self.rebuild_routes();
        self.refresh_loop_length();
        self.scheduler.reset(self.schedule_origin());
        debug!(target: "treeseq::project", "project loaded: {} tracks, {} routes, loop {} beats",
            self.tracks.len(), self.routes.len(), self.loop_length);
    }

    /// Insert a track or update the existing one in place. An existing
    /// track keeps its explicit events; only the pattern is replaced. The
    /// caller rebuilds routes afterwards.
    fn upsert_track(&mut self, spec: TrackSpec) -> Handle {
        let TrackSpec {
            id,
            settings,
            mix,
            sequence,
            effect_ids,
            timeline_track_id,
        } = spec;

        if let Some(handle) = self.tracks.handle_of(&id) {
            if let Some(track) = self.tracks.get_mut(handle) {
                match &settings {
                    Some(s) => self.synths.update_synth_settings(handle, s, track.seed),
                    None => self.synths.retire(handle),
                }
                track.settings = settings;
                track.sequence.replace_pattern_from(sequence);
                track.effect_ids = effect_ids;
                track.timeline_track_id = timeline_track_id;
            }
            self.track_state.insert(handle, mix);
            self.scheduler.purge_track(handle);
            debug!(target: "treeseq::project", "track '{id}' replaced");
            return handle;
        }

        let track = Track {
            id: Arc::from(id.as_str()),
            seed: seed_for(&id),
            settings,
            sequence,
            effect_ids,
            timeline_track_id,
        };
        let (handle, _) = self.tracks.insert(&id, track);
        self.track_state.insert(handle, mix);
        debug!(target: "treeseq::project", "track '{id}' added");
        handle
    }

    fn remove_track(&mut self, id: &str) {
        let Some(handle) = self.tracks.handle_of(id) else {
            return;
        };
        self.tracks.remove(id);
        self.track_state.remove(handle);
        self.synths.remove_synth(handle);
        self.scheduler.purge_track(handle);
        self.rebuild_routes();
        self.refresh_loop_length();
        debug!(target: "treeseq::project", "track '{id}' removed");
    }

    fn edit_sequence(&mut self, id: &str, edit: impl FnOnce(&mut TrackSequence)) {
        let Some(handle) = self.tracks.handle_of(id) else {
            return;
        };
        if let Some(track) = self.tracks.get_mut(handle) {
            edit(&mut track.sequence);
        }
        self.scheduler.purge_track(handle);
        self.rebuild_routes();
        self.refresh_loop_length();
        self.reseed_track(handle);
    }

    fn replace_effect(&mut self, spec: EffectSpec) {
        let kind = spec.settings.as_ref().map(EffectSettings::kind);
        if let Some(entry) = self.effects.get_mut_by_id(&spec.id) {
            if entry.kind() == kind {
                entry.settings = spec.settings;
                entry.enabled = spec.enabled;
                return;
            }
        }
        self.effects.insert(
            &spec.id,
            EffectEntry {
                settings: spec.settings,
                enabled: spec.enabled,
            },
        );
        self.rebuild_routes();
    }

    fn update_envelope(&mut self, id: &str, patch: EnvelopePatch) {
        if let Some(env) = self.envelopes.get_mut_by_id(id) {
            if let Some(target) = patch.target {
                env.target = target;
            }
            if let Some(points) = patch.points {
                env.set_points(points);
            }
            if let Some(enabled) = patch.enabled {
                env.enabled = enabled;
            }
            return;
        }
        match envelope_from_patch(&patch) {
            Some(env) => {
                self.envelopes.insert(id, env);
                self.rebuild_routes();
            }
            None => warn!(target: "treeseq::project", "envelope '{id}' does not exist and has no target"),
        }
    }

    /// Rebuild every route from the current tracks, lanes and effects.
    /// Effect state is carried over for routes and effects that survive,
    /// new slots take their state from the stock, and whatever is left over
    /// is retired.
    fn rebuild_routes(&mut self) {
        let old = std::mem::take(&mut self.routes);
        let old_keys: Vec<RouteKey> = old.iter().map(|r| (r.track, r.lane)).collect();

        let mut builder = RouteBuilder {
            sample_rate: self.config.sample_rate,
            effects: &self.effects,
            envelopes: &self.envelopes,
            lanes: &self.lanes,
            old,
            stock: std::mem::take(&mut self.stock),
            allocated: 0,
            routes: Vec::new(),
            index: HashMap::new(),
        };
        let mut default_routes = HashMap::new();

        for (handle, track) in self.tracks.iter_mut() {
            let default_lane = track
                .timeline_track_id
                .as_deref()
                .and_then(|id| builder.lanes.handle_of(id));
            let default_route = builder.intern(handle, &track.id, default_lane, &track.effect_ids);
            default_routes.insert(handle, default_route);

            let (track_id, effect_ids) = (&track.id, &track.effect_ids);
            for note in track.sequence.notes_mut() {
                let lane = note
                    .pattern_id
                    .as_deref()
                    .and_then(|p| self.pattern_to_lane.get(p))
                    .and_then(|id| builder.lanes.handle_of(id))
                    .or(default_lane);
                note.route = builder.intern(handle, track_id, lane, effect_ids);
            }
        }

        let remap: Vec<usize> = old_keys
            .iter()
            .map(|key| {
                builder
                    .index
                    .get(key)
                    .or_else(|| default_routes.get(&key.0))
                    .copied()
                    .unwrap_or(usize::MAX)
            })
            .collect();

        for route in &mut builder.old {
            self.retired.extend(route.chain.drain(..).map(|slot| slot.state));
        }
        self.retired.extend(builder.stock.drain(..).map(|s| s.state));
        self.effect_allocations += builder.allocated;

        self.routes = builder.routes;
        self.synths.remap_routes(&remap);
        self.scheduler.remap_routes(&remap);
        self.mixer.prepare(self.routes.len());
    }

    fn refresh_loop_length(&mut self) {
        let content = self
            .tracks
            .iter()
            .map(|(_, t)| t.sequence.end_beat())
            .fold(0.0, f64::max);
        self.loop_length = match self.explicit_loop_length {
            Some(beats) => beats,
            None if content > 0.0 => content,
            None => DEFAULT_LOOP_BEATS,
        };
    }

    // ── Scheduling ──────────────────────────────────────────

    /// Earliest beat whose sample time has not been rendered yet.
    fn schedule_origin(&self) -> f64 {
        let sample = self.playback.current_sample() as f64;
        (sample - 0.5).max(0.0) / self.playback.samples_per_beat()
    }

    fn loop_samples(&self) -> u64 {
        self.playback.beat_to_sample(self.loop_length).max(1)
    }

    fn schedule_ahead(&mut self) {
        let lookahead = self.playback.seconds_to_beats(self.config.lookahead_seconds);
        let end = self.playback.current_beat() + lookahead;
        self.scheduler.schedule_window(
            self.tracks.iter().map(|(h, t)| (h, &t.sequence)),
            end,
            self.loop_length,
            self.playback.samples_per_beat(),
        );
    }

    /// Re-schedule one track's already-covered window after an edit.
    fn reseed_track(&mut self, handle: Handle) {
        let from = self.schedule_origin();
        let until = self.scheduler.scheduled_until();
        if until <= from {
            return;
        }
        if let Some(track) = self.tracks.get(handle) {
            self.scheduler.schedule_track(
                handle,
                &track.sequence,
                from,
                until,
                self.loop_length,
                self.playback.samples_per_beat(),
            );
        }
    }

    fn wrap(&mut self) {
        trace!(target: "treeseq::scheduler", "loop wrap after {} beats", self.loop_length);
        self.playback.rewind();
        self.scheduler.reset(0.0);
        self.schedule_ahead();
    }

    fn fire_due(&mut self) {
        let now = self.playback.current_sample();
        while let Some(mut bucket) = self.scheduler.pop_due(now) {
            for event in bucket.drain(..) {
                self.trigger(event);
            }
            self.scheduler.recycle(bucket);
        }
    }

    fn trigger(&mut self, event: ScheduledEvent) {
        let Some(track) = self.tracks.get(event.track) else {
            return;
        };
        let Some(settings) = &track.settings else {
            return;
        };
        if let Some(log) = &mut self.trigger_log {
            log.push(TriggerRecord {
                frame: self.frames_rendered,
                beat: event.beat,
                track_id: Arc::clone(&track.id),
                event_id: Arc::clone(&event.event_id),
                velocity: event.velocity,
                pitch: event.pitch,
            });
        }
        self.synths.trigger_note(
            event.track,
            settings,
            track.seed,
            event.velocity,
            event.pitch,
            event.route,
            event.event_id,
        );
    }

    // ── Rendering ───────────────────────────────────────────

    /// Render one block into `left`/`right` (the shorter length wins).
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        let playing = self.playback.state() == TransportState::Playing;
        let any_solo = self.track_state.any_solo();

        if playing {
            self.schedule_ahead();
        }
        for i in 0..frames {
            if playing {
                if self.playback.current_sample() >= self.loop_samples() {
                    self.wrap();
                }
                if self.playback.current_beat() >= self.scheduler.scheduled_until() {
                    self.schedule_ahead();
                }
                self.fire_due();
            }

            let ctx = MixContext {
                beat: self.playback.current_beat(),
                any_solo,
                track_state: &self.track_state,
                effects: &self.effects,
                envelopes: &self.envelopes,
            };
            let (l, r) = self.mixer.mix_frame(&ctx, &mut self.routes, &mut self.synths);
            left[i] = l as f32;
            right[i] = r as f32;

            if playing {
                self.playback.advance();
            }
            self.frames_rendered += 1;
        }
        self.synths.prune();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::command::project_plan;
    use crate::messages::ProjectDescriptor;
    use serde_json::json;

    fn manager_with(project: serde_json::Value) -> ProjectManager {
        let desc: ProjectDescriptor = serde_json::from_value(project).unwrap();
        let mut pm = ProjectManager::new(EngineConfig::default());
        pm.apply(Command::LoadProject(Box::new(project_plan(&desc).unwrap())));
        pm.enable_trigger_log();
        pm
    }

    fn two_hit_project() -> serde_json::Value {
        json!({
            "bpm": 120,
            "tracks": [{
                "id": "kick",
                "type": "kick",
                "baseMeter": 4,
                "pattern": { "id": "root", "children": [
                    { "id": "a", "velocity": 1.0, "pitch": 60 },
                    { "id": "b", "velocity": 1.0, "pitch": 60 }
                ]}
            }]
        })
    }

    fn play(pm: &mut ProjectManager, at: f64) {
        pm.apply(Command::SetTransport {
            state: TransportState::Playing,
            position_beats: at,
        });
    }

    fn run(pm: &mut ProjectManager, frames: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        for (l, r) in left.chunks_mut(128).zip(right.chunks_mut(128)) {
            pm.render(l, r);
        }
        (left, right)
    }

    #[test]
    fn two_leaves_trigger_at_zero_and_one_second() {
        let mut pm = manager_with(two_hit_project());
        play(&mut pm, 0.0);
        run(&mut pm, 88_200);

        let triggers = pm.take_triggers();
        let frames: Vec<u64> = triggers.iter().map(|t| t.frame).collect();
        assert_eq!(frames, vec![0, 44_100]);
        assert_eq!(&*triggers[1].event_id, "b");
    }

    #[test]
    fn pattern_loops() {
        let mut pm = manager_with(two_hit_project());
        assert_eq!(pm.loop_length(), 4.0);
        play(&mut pm, 0.0);
        run(&mut pm, 88_200 * 2);
        let frames: Vec<u64> = pm.take_triggers().iter().map(|t| t.frame).collect();
        assert_eq!(frames, vec![0, 44_100, 88_200, 132_300]);
    }

    #[test]
    fn stopped_transport_does_not_trigger() {
        let mut pm = manager_with(two_hit_project());
        let (left, _) = run(&mut pm, 4096);
        assert!(pm.take_triggers().is_empty());
        assert!(left.iter().all(|&s| s == 0.0));
        assert_eq!(pm.playback().current_sample(), 0);
    }

    #[test]
    fn playing_produces_audio_in_range() {
        let mut pm = manager_with(two_hit_project());
        play(&mut pm, 0.0);
        let (left, right) = run(&mut pm, 8192);
        assert!(left.iter().any(|&s| s.abs() > 0.01), "kick should be audible");
        assert!(left.iter().chain(&right).all(|s| s.is_finite() && s.abs() <= 1.0));
        // Centre pan: both sides match.
        assert!(left.iter().zip(&right).all(|(l, r)| (l - r).abs() < 1e-6));
    }

    #[test]
    fn muted_track_still_triggers_but_is_silent() {
        let mut pm = manager_with(two_hit_project());
        pm.apply(Command::SetTrackMute("kick".to_string(), true));
        play(&mut pm, 0.0);
        let (left, _) = run(&mut pm, 4096);
        assert_eq!(pm.take_triggers().len(), 1);
        assert!(left.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn tempo_change_keeps_beat_and_reschedules() {
        let mut pm = manager_with(two_hit_project());
        play(&mut pm, 0.0);
        run(&mut pm, 22_050); // beat 1
        pm.apply(Command::SetTempo(60.0));
        assert_eq!(pm.playback().current_beat(), 1.0);
        pm.take_triggers();
        // Beat 2 is now one second away.
        run(&mut pm, 44_100 + 128);
        let triggers = pm.take_triggers();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].frame, 22_050 + 44_100);
    }

    #[test]
    fn editing_pattern_only_reschedules_that_track() {
        let mut pm = manager_with(json!({
            "bpm": 120,
            "tracks": [
                { "id": "a", "type": "kick", "pattern": { "id": "r", "children": [{ "id": "a1" }, { "id": "a2" }] } },
                { "id": "b", "type": "snare", "pattern": { "id": "r", "children": [{ "id": "b1" }, { "id": "b2" }] } }
            ]
        }));
        play(&mut pm, 0.0);
        run(&mut pm, 128);
        let before = pm.scheduler().pending();

        pm.apply(Command::SetTrackPattern {
            track_id: "a".to_string(),
            events: Vec::new(),
            base_meter: 4.0,
        });
        assert!(pm.scheduler().pending() <= before);
        run(&mut pm, 88_200);
        let ids: Vec<String> = pm.take_triggers().iter().map(|t| t.event_id.to_string()).collect();
        assert!(ids.contains(&"b2".to_string()));
        assert!(!ids.contains(&"a2".to_string()));
    }

    #[test]
    fn remove_track_drops_schedule_and_voice() {
        let mut pm = manager_with(two_hit_project());
        play(&mut pm, 0.0);
        run(&mut pm, 256);
        pm.apply(Command::RemoveTrack("kick".to_string()));
        assert_eq!(pm.scheduler().pending(), 0);
        assert!(pm.routes().is_empty());
        let (left, _) = run(&mut pm, 1024);
        assert!(left.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn effect_state_survives_route_rebuild() {
        let mut pm = manager_with(json!({
            "bpm": 120,
            "tracks": [{ "id": "k", "type": "kick", "effectIds": ["d"],
                "pattern": { "id": "r", "children": [{ "id": "x" }] } }],
            "effects": [{ "id": "d", "type": "delay", "settings": { "time": 0.5, "feedback": 0.9, "mix": 1.0 } }]
        }));
        play(&mut pm, 0.0);
        run(&mut pm, 20_000);

        // An unrelated track triggers a rebuild.
        let spec = crate::engine::command::track_spec(
            "other",
            &crate::messages::TrackDescriptor::new("other", "snare"),
        )
        .unwrap();
        pm.apply(Command::UpsertTrack(Box::new(spec)));
        assert_eq!(pm.routes().len(), 2);

        // The first echo lands at 0.5 s even though the dry kick has died away.
        let (left, _) = run(&mut pm, 4_000);
        assert!(left.iter().any(|&s| s.abs() > 1e-3), "delay tail should continue");
    }

    #[test]
    fn replacing_a_track_keeps_notes_already_in_the_lookahead() {
        let mut pm = manager_with(two_hit_project());
        play(&mut pm, 0.0);
        // "b" at frame 44_100 is inside the scheduled window by now.
        run(&mut pm, 40_064);
        assert_eq!(pm.take_triggers().len(), 1);

        let desc: ProjectDescriptor = serde_json::from_value(two_hit_project()).unwrap();
        let spec = crate::engine::command::track_spec("kick", &desc.tracks[0]).unwrap();
        pm.apply(Command::UpsertTrack(Box::new(spec)));
        run(&mut pm, 10_000);

        let frames: Vec<u64> = pm.take_triggers().iter().map(|t| t.frame).collect();
        assert_eq!(frames, vec![44_100]);
    }

    #[test]
    fn replacing_a_track_keeps_its_explicit_events() {
        let mut pm = manager_with(json!({
            "bpm": 120,
            "tracks": [{ "id": "k", "type": "kick" }],
            "events": [{ "id": "e", "time": 1, "instrumentId": "k" }]
        }));
        let spec = crate::engine::command::track_spec(
            "k",
            &crate::messages::TrackDescriptor::new("k", "snare"),
        )
        .unwrap();
        pm.apply(Command::UpsertTrack(Box::new(spec)));
        assert_eq!(pm.loop_length(), 2.0);

        play(&mut pm, 0.0);
        run(&mut pm, 44_032);
        let triggers = pm.take_triggers();
        assert_eq!(triggers.len(), 1);
        assert_eq!(&*triggers[0].event_id, "e");
        assert_eq!(triggers[0].frame, 22_050);
    }

    #[test]
    fn muted_route_holds_its_effect_tail_until_unmuted() {
        let mut pm = manager_with(json!({
            "bpm": 120,
            "tracks": [{ "id": "k", "type": "kick", "effectIds": ["d"],
                "pattern": { "id": "r", "children": [{ "id": "x" }] } }],
            "effects": [{ "id": "d", "type": "delay", "settings": { "time": 0.5, "feedback": 0.0, "mix": 1.0 } }]
        }));
        play(&mut pm, 0.0);
        run(&mut pm, 11_008);

        pm.apply(Command::SetTrackMute("k".to_string(), true));
        let (muted, _) = run(&mut pm, 22_016);
        assert!(muted.iter().all(|&s| s == 0.0));

        pm.apply(Command::SetTrackMute("k".to_string(), false));
        let (after, _) = run(&mut pm, 16_384);
        // The line stood still while muted: 11_008 samples in, the kick
        // comes out 22_050 samples after it went in.
        let echo_at = 22_050 - 11_008;
        assert!(after[..echo_at - 64].iter().all(|s| s.abs() < 1e-9));
        assert!(after[echo_at..echo_at + 4_000].iter().any(|s| s.abs() > 1e-3));
    }

    #[test]
    fn unstocked_effect_state_is_counted() {
        let mut pm = manager_with(json!({
            "bpm": 120,
            "tracks": [{ "id": "k", "type": "kick", "effectIds": ["d"] }],
            "effects": [{ "id": "d", "type": "delay" }]
        }));
        assert_eq!(pm.effect_allocations(), 1);
        assert!(pm.take_retired().is_empty());

        pm.apply(Command::RemoveTrack("k".to_string()));
        let retired = pm.take_retired();
        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].kind(), EffectKind::Delay);
    }

    #[test]
    fn timeline_lane_routing() {
        let mut pm = manager_with(json!({
            "bpm": 120,
            "tracks": [{ "id": "k", "type": "kick" }],
            "events": [
                { "id": "e1", "time": 0, "instrumentId": "k", "patternId": "clip" },
                { "id": "e2", "time": 1, "instrumentId": "k" }
            ],
            "timeline": { "tracks": [{ "id": "lane", "envelopeIds": ["mute"] }] },
            "envelopes": [{ "id": "mute", "target": "volume", "points": [{ "beat": 0, "value": 0 }] }],
            "patternToTrackId": { "clip": "lane" }
        }));
        assert_eq!(pm.routes().len(), 2, "default route plus the lane route");
        assert_eq!(pm.loop_length(), 2.0);

        play(&mut pm, 0.0);
        let (left, _) = run(&mut pm, 11_025);
        assert!(left.iter().all(|&s| s == 0.0), "lane automation silences e1");
        let (left, _) = run(&mut pm, 22_050);
        assert!(left.iter().any(|&s| s.abs() > 0.01), "e2 uses the default route");
    }

    #[test]
    fn solo_silences_other_tracks() {
        let mut pm = manager_with(json!({
            "bpm": 120,
            "tracks": [
                { "id": "a", "type": "kick", "pattern": { "id": "r", "children": [{ "id": "a1" }] } },
                { "id": "b", "type": "kick", "solo": true, "mute": true,
                  "pattern": { "id": "r", "children": [{ "id": "b1" }] } }
            ]
        }));
        play(&mut pm, 0.0);
        let (left, _) = run(&mut pm, 4096);
        assert!(left.iter().all(|&s| s == 0.0), "a is not soloed, b is muted");
    }

    #[test]
    fn position_reports_active_leaves() {
        let mut pm = manager_with(two_hit_project());
        play(&mut pm, 0.0);
        run(&mut pm, 1024);
        let pos = pm.position();
        assert_eq!(pos.active_event_ids, vec!["a".to_string()]);
        assert!((pos.time_in_beats - 1024.0 / 22_050.0).abs() < 1e-12);
    }

    #[test]
    fn seeds_are_stable() {
        assert_eq!(seed_for("kick"), seed_for("kick"));
        assert_ne!(seed_for("kick"), seed_for("snare"));
    }
}
