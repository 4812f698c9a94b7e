//! Lookahead event scheduler.
//!
//! Track notes live in beats. Each block, the notes falling in the next
//! lookahead window are converted to absolute sample times and dropped into
//! time-keyed buckets; the per-sample loop then fires every bucket that has
//! come due. Windows are half-open and contiguous (`[scheduled_until, end)`),
//! so a note sitting exactly on a window boundary is scheduled once.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::arena::Handle;
use crate::pattern::AudioEvent;

// ── Track sequences ─────────────────────────────────────────

/// One note of a track, in beats from the start of its pattern or loop.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedNote {
    pub beat: f64,
    pub velocity: f64,
    pub pitch: u8,
    pub event_id: Arc<str>,
    pub pattern_id: Option<Arc<str>>,
    /// Route the note plays through; resolved when routes are rebuilt.
    pub route: usize,
}

impl SequencedNote {
    pub fn from_event(event: &AudioEvent) -> Option<Self> {
        if !(event.time.is_finite() && event.time >= 0.0) {
            return None;
        }
        let velocity = if event.velocity.is_finite() {
            event.velocity.clamp(0.0, 1.0)
        } else {
            1.0
        };
        Some(SequencedNote {
            beat: event.time,
            velocity,
            pitch: event.pitch.min(127),
            event_id: Arc::from(event.id.as_str()),
            pattern_id: event.pattern_id.as_deref().map(Arc::from),
            route: 0,
        })
    }
}

/// Where an explicit event stops occupying the timeline. A zero-length event
/// still takes one beat.
fn event_end(event: &AudioEvent) -> f64 {
    let length = if event.duration.is_finite() && event.duration > 0.0 {
        event.duration
    } else {
        1.0
    };
    event.time + length
}

fn to_notes(events: &[AudioEvent]) -> Vec<SequencedNote> {
    let mut notes: Vec<_> = events.iter().filter_map(SequencedNote::from_event).collect();
    notes.sort_by(|a, b| a.beat.total_cmp(&b.beat));
    notes
}

/// Everything a track plays: a repeating pattern and/or one-shot events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackSequence {
    pattern: Vec<SequencedNote>,
    /// Pattern repeat period in beats; `None` when the track has no pattern.
    pattern_length: Option<f64>,
    /// Played once per loop pass.
    events: Vec<SequencedNote>,
    events_end: f64,
}

impl TrackSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pattern with flattened `events` repeating every `length` beats.
    pub fn set_pattern(&mut self, events: &[AudioEvent], length: f64) {
        if length.is_finite() && length > 0.0 {
            self.pattern = to_notes(events);
            self.pattern.retain(|n| n.beat < length);
            self.pattern_length = Some(length);
        } else {
            self.pattern.clear();
            self.pattern_length = None;
        }
    }

    pub fn set_events(&mut self, events: &[AudioEvent]) {
        self.events = to_notes(events);
        self.events_end = events
            .iter()
            .filter(|e| e.time.is_finite() && e.time >= 0.0)
            .map(event_end)
            .fold(0.0, f64::max);
    }

    /// Take the pattern of `other`, keeping this sequence's explicit events.
    pub fn replace_pattern_from(&mut self, other: TrackSequence) {
        self.pattern = other.pattern;
        self.pattern_length = other.pattern_length;
    }

    pub fn pattern_length(&self) -> Option<f64> {
        self.pattern_length
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty() && self.events.is_empty()
    }

    /// Beat at which this track's content ends (used for the loop length).
    pub fn end_beat(&self) -> f64 {
        self.pattern_length.unwrap_or(0.0).max(self.events_end)
    }

    pub fn pattern_notes(&self) -> &[SequencedNote] {
        &self.pattern
    }

    pub fn event_notes(&self) -> &[SequencedNote] {
        &self.events
    }

    pub fn notes_mut(&mut self) -> impl Iterator<Item = &mut SequencedNote> {
        self.pattern.iter_mut().chain(self.events.iter_mut())
    }

    /// Call `f` for every occurrence in `[start, end)` below `loop_length`.
    fn for_each_in(&self, start: f64, end: f64, loop_length: f64, mut f: impl FnMut(&SequencedNote, f64)) {
        let end = end.min(loop_length);
        if end <= start {
            return;
        }
        if let Some(period) = self.pattern_length {
            for note in &self.pattern {
                // Start one period early and test explicitly, so a rounding
                // error in the division can never skip a boundary note.
                let mut k = (((start - note.beat) / period).floor() - 1.0).max(0.0);
                loop {
                    let beat = note.beat + k * period;
                    if beat >= end {
                        break;
                    }
                    if beat >= start {
                        f(note, beat);
                    }
                    k += 1.0;
                }
            }
        }
        for note in &self.events {
            if note.beat >= start && note.beat < end {
                f(note, note.beat);
            }
        }
    }
}

// ── Scheduler ───────────────────────────────────────────────

/// A note converted to sample time, waiting to fire.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    pub track: Handle,
    pub route: usize,
    pub beat: f64,
    pub velocity: f64,
    pub pitch: u8,
    pub event_id: Arc<str>,
}

#[derive(Debug, Clone, Default)]
pub struct EventScheduler {
    buckets: BTreeMap<u64, Vec<ScheduledEvent>>,
    /// Emptied bucket vectors, reused to avoid reallocating.
    spare: Vec<Vec<ScheduledEvent>>,
    /// Everything before this beat has been converted already.
    scheduled_until: f64,
}

impl EventScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled_until(&self) -> f64 {
        self.scheduled_until
    }

    /// Number of events waiting to fire.
    pub fn pending(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Drop every pending bucket and restart scheduling at `from_beat`.
    pub fn reset(&mut self, from_beat: f64) {
        while let Some((_, bucket)) = self.buckets.pop_first() {
            self.recycle(bucket);
        }
        self.scheduled_until = from_beat.max(0.0);
    }

    /// Schedule every track's notes from `scheduled_until` up to `end`.
    pub fn schedule_window<'a>(
        &mut self,
        tracks: impl Iterator<Item = (Handle, &'a TrackSequence)>,
        end: f64,
        loop_length: f64,
        samples_per_beat: f64,
    ) {
        let start = self.scheduled_until;
        let end = end.min(loop_length);
        if end <= start {
            return;
        }
        for (track, sequence) in tracks {
            self.schedule_track(track, sequence, start, end, loop_length, samples_per_beat);
        }
        self.scheduled_until = end;
    }

    /// Schedule one track's notes in `[start, end)` without moving the window.
    /// Used to re-seed a track after its pending events were purged.
    pub fn schedule_track(
        &mut self,
        track: Handle,
        sequence: &TrackSequence,
        start: f64,
        end: f64,
        loop_length: f64,
        samples_per_beat: f64,
    ) {
        sequence.for_each_in(start, end, loop_length, |note, beat| {
            let key = (beat * samples_per_beat).round() as u64;
            let event = ScheduledEvent {
                track,
                route: note.route,
                beat,
                velocity: note.velocity,
                pitch: note.pitch,
                event_id: Arc::clone(&note.event_id),
            };
            self.insert(key, event);
        });
    }

    fn insert(&mut self, key: u64, event: ScheduledEvent) {
        let spare = &mut self.spare;
        self.buckets
            .entry(key)
            .or_insert_with(|| spare.pop().unwrap_or_default())
            .push(event);
    }

    /// Remove the pending events of one track, leaving other tracks alone.
    pub fn purge_track(&mut self, track: Handle) {
        for bucket in self.buckets.values_mut() {
            bucket.retain(|e| e.track != track);
        }
        let emptied: Vec<u64> = self
            .buckets
            .iter()
            .filter(|(_, b)| b.is_empty())
            .map(|(&k, _)| k)
            .collect();
        for key in emptied {
            if let Some(bucket) = self.buckets.remove(&key) {
                self.recycle(bucket);
            }
        }
    }

    /// Re-key pending events after a tempo change. Their beats are unchanged.
    pub fn retime(&mut self, samples_per_beat: f64) {
        let old = std::mem::take(&mut self.buckets);
        for (_, mut bucket) in old {
            for event in bucket.drain(..) {
                let key = (event.beat * samples_per_beat).round() as u64;
                self.insert(key, event);
            }
            self.recycle(bucket);
        }
    }

    /// Point pending events at new route indices after a route rebuild.
    pub fn remap_routes(&mut self, remap: &[usize]) {
        for event in self.buckets.values_mut().flatten() {
            if let Some(&route) = remap.get(event.route) {
                event.route = route;
            }
        }
    }

    /// Take the earliest bucket due at or before `current_sample`.
    pub fn pop_due(&mut self, current_sample: u64) -> Option<Vec<ScheduledEvent>> {
        let (&key, _) = self.buckets.first_key_value()?;
        if key > current_sample {
            return None;
        }
        self.buckets.pop_first().map(|(_, bucket)| bucket)
    }

    /// Hand a fired bucket back for reuse.
    pub fn recycle(&mut self, mut bucket: Vec<ScheduledEvent>) {
        bucket.clear();
        self.spare.push(bucket);
    }
}
