//! Pattern trees and their flattening into timed events.
//!
//! A pattern is a recursive subdivision: each node splits its parent's time
//! span among its children in proportion to their `division` weights. The
//! flattener walks the tree once and emits one [`AudioEvent`] per leaf.

use log::warn;
use serde::{Deserialize, Serialize};

/// Deepest subdivision the flattener will follow. Deeper subtrees are dropped.
pub const MAX_PATTERN_DEPTH: usize = 64;

/// Velocity of a leaf that does not set one.
pub const DEFAULT_VELOCITY: f64 = 1.0;

/// MIDI pitch of a leaf that does not set one (C4).
pub const DEFAULT_PITCH: u8 = 60;

fn default_division() -> f64 {
    1.0
}

fn default_velocity() -> f64 {
    DEFAULT_VELOCITY
}

fn default_pitch() -> u8 {
    DEFAULT_PITCH
}

// ── Data model ──────────────────────────────────────────────

/// One node of a pattern tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternNode {
    #[serde(default)]
    pub id: String,
    /// Relative time weight among siblings (> 0).
    #[serde(default = "default_division")]
    pub division: f64,
    #[serde(default)]
    pub children: Vec<PatternNode>,
    /// Leaf velocity [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    /// Leaf MIDI pitch [0, 127].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<u8>,
}

impl PatternNode {
    /// A leaf with explicit velocity and pitch.
    pub fn leaf(id: &str, division: f64, velocity: f64, pitch: u8) -> Self {
        PatternNode {
            id: id.to_string(),
            division,
            children: Vec::new(),
            velocity: Some(velocity),
            pitch: Some(pitch),
        }
    }

    /// An inner node.
    pub fn group(id: &str, division: f64, children: Vec<PatternNode>) -> Self {
        PatternNode {
            id: id.to_string(),
            division,
            children,
            velocity: None,
            pitch: None,
        }
    }

    /// The empty-pattern sentinel: no children, nothing to play.
    pub fn empty(id: &str) -> Self {
        PatternNode::group(id, 1.0, Vec::new())
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn is_empty_sentinel(&self) -> bool {
        self.children.is_empty() && self.velocity.is_none() && self.pitch.is_none()
    }
}

/// A single note event produced by flattening, relative to the pattern origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioEvent {
    /// Id of the leaf that produced the event (reported back while it plays).
    #[serde(default)]
    pub id: String,
    /// Start time in beats.
    pub time: f64,
    /// Time span the leaf occupies, in beats.
    #[serde(default)]
    pub duration: f64,
    #[serde(default = "default_velocity")]
    pub velocity: f64,
    #[serde(default = "default_pitch")]
    pub pitch: u8,
    pub instrument_id: String,
    /// Pattern clip the event belongs to; selects effect/envelope routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
}

// ── Flattening ──────────────────────────────────────────────

/// Flatten a pattern tree into events spanning exactly `base_meter` beats.
///
/// The root's own subdivision (the sum of its children's weights) is mapped
/// onto `base_meter`, so a tree authored in three parts still fills a four-beat
/// pattern with evenly spaced notes.
pub fn flatten(root: &PatternNode, base_meter: f64, instrument_id: &str) -> Vec<AudioEvent> {
    let mut events = Vec::new();

    if !(base_meter.is_finite() && base_meter > 0.0) {
        warn!(target: "treeseq::pattern", "pattern '{}' has invalid base meter {base_meter}", root.id);
        return events;
    }
    if root.is_empty_sentinel() {
        return events;
    }

    let root_division = if root.is_leaf() {
        base_meter
    } else {
        division_sum(&root.children)
    };
    if root_division <= 0.0 {
        warn!(target: "treeseq::pattern", "pattern '{}' subdivides into zero total weight", root.id);
        return events;
    }

    distribute(root, 0.0, root_division, instrument_id, 0, &mut events);

    let scale = base_meter / root_division;
    for event in &mut events {
        event.time *= scale;
        event.duration *= scale;
    }
    events.sort_by(|a, b| a.time.total_cmp(&b.time));
    events
}

fn distribute(
    node: &PatternNode,
    start: f64,
    span: f64,
    instrument_id: &str,
    depth: usize,
    out: &mut Vec<AudioEvent>,
) {
    if node.is_leaf() {
        out.push(leaf_event(node, start, span, instrument_id));
        return;
    }
    if depth >= MAX_PATTERN_DEPTH {
        warn!(target: "treeseq::pattern", "node '{}' exceeds max depth {MAX_PATTERN_DEPTH}", node.id);
        return;
    }

    let total = division_sum(&node.children);
    if total <= 0.0 {
        warn!(target: "treeseq::pattern", "node '{}' subdivides into zero total weight", node.id);
        return;
    }

    // Child starts come from the running weight prefix rather than a running
    // time sum, so thirds and fifths do not drift.
    let mut prefix = 0.0;
    for child in &node.children {
        let weight = weight_of(child);
        if weight <= 0.0 {
            continue;
        }
        let child_start = start + span * (prefix / total);
        let child_span = span * (weight / total);
        distribute(child, child_start, child_span, instrument_id, depth + 1, out);
        prefix += weight;
    }
}

fn leaf_event(node: &PatternNode, start: f64, span: f64, instrument_id: &str) -> AudioEvent {
    AudioEvent {
        id: node.id.clone(),
        time: start,
        duration: span,
        velocity: node
            .velocity
            .filter(|v| v.is_finite())
            .unwrap_or(DEFAULT_VELOCITY)
            .clamp(0.0, 1.0),
        pitch: node.pitch.unwrap_or(DEFAULT_PITCH).min(127),
        instrument_id: instrument_id.to_string(),
        pattern_id: None,
    }
}

/// Non-positive or non-finite weights count as zero.
fn weight_of(node: &PatternNode) -> f64 {
    if node.division.is_finite() && node.division > 0.0 {
        node.division
    } else {
        0.0
    }
}

fn division_sum(children: &[PatternNode]) -> f64 {
    children.iter().map(weight_of).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, division: f64) -> PatternNode {
        PatternNode::leaf(id, division, 1.0, 60)
    }

    fn times(events: &[AudioEvent]) -> Vec<f64> {
        events.iter().map(|e| e.time).collect()
    }

    #[test]
    fn proportional_subdivision() {
        let root = PatternNode::group("root", 1.0, vec![hit("a", 1.0), hit("b", 3.0)]);
        let events = flatten(&root, 4.0, "kick");

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].time, 0.0);
        assert_eq!(events[0].duration, 1.0);
        assert_eq!(events[1].time, 1.0);
        assert_eq!(events[1].duration, 3.0);
        assert!(events.iter().all(|e| e.instrument_id == "kick"));
    }

    #[test]
    fn two_equal_halves() {
        let root = PatternNode::group("root", 1.0, vec![hit("a", 1.0), hit("b", 1.0)]);
        let events = flatten(&root, 4.0, "kick");
        assert_eq!(times(&events), vec![0.0, 2.0]);
    }

    #[test]
    fn base_meter_rescales_root_division() {
        let root = PatternNode::group(
            "root",
            1.0,
            vec![hit("a", 1.0), hit("b", 1.0), hit("c", 1.0)],
        );
        let unscaled = flatten(&root, 3.0, "t");
        let scaled = flatten(&root, 4.0, "t");

        assert_eq!(times(&unscaled), vec![0.0, 1.0, 2.0]);
        for (u, s) in unscaled.iter().zip(&scaled) {
            assert!(
                (s.time - u.time * 4.0 / 3.0).abs() < 1e-12,
                "expected {} * 4/3, got {}",
                u.time,
                s.time
            );
        }
    }

    #[test]
    fn nested_polyrhythm_covers_pattern() {
        // Two halves; the second half splits into a triplet.
        let root = PatternNode::group(
            "root",
            1.0,
            vec![
                hit("a", 1.0),
                PatternNode::group("tri", 1.0, vec![hit("b", 1.0), hit("c", 1.0), hit("d", 1.0)]),
            ],
        );
        let base = 4.0;
        let events = flatten(&root, base, "t");

        assert_eq!(events.len(), 4);
        let total: f64 = events.iter().map(|e| e.duration).sum();
        assert!((total - base).abs() < 1e-12, "durations sum to {total}");
        for e in &events {
            assert!(e.time >= 0.0 && e.time < base, "time {} out of range", e.time);
        }
        assert!((events[2].time - (2.0 + 2.0 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn coverage_with_odd_weights_and_meter() {
        let root = PatternNode::group(
            "root",
            1.0,
            vec![
                hit("a", 2.0),
                PatternNode::group(
                    "g",
                    5.0,
                    vec![hit("b", 1.0), hit("c", 7.0), PatternNode::group("h", 3.0, vec![hit("d", 1.0), hit("e", 2.0)])],
                ),
                hit("f", 0.5),
            ],
        );
        let base = 7.0;
        let events = flatten(&root, base, "t");

        assert_eq!(events.len(), 6);
        let total: f64 = events.iter().map(|e| e.duration).sum();
        assert!((total - base).abs() < 1e-9);
        assert!(events.iter().all(|e| e.time >= 0.0 && e.time < base));
        assert!(events.windows(2).all(|w| w[0].time <= w[1].time), "events must be sorted");
    }

    #[test]
    fn empty_pattern_sentinel() {
        let root = PatternNode::empty("root");
        assert!(flatten(&root, 4.0, "t").is_empty());
    }

    #[test]
    fn childless_root_with_velocity_plays_once() {
        let mut root = PatternNode::empty("root");
        root.velocity = Some(0.5);
        let events = flatten(&root, 4.0, "t");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time, 0.0);
        assert_eq!(events[0].duration, 4.0);
        assert_eq!(events[0].velocity, 0.5);
        assert_eq!(events[0].pitch, DEFAULT_PITCH);
    }

    #[test]
    fn leaf_defaults_apply() {
        let mut bare = PatternNode::empty("bare");
        bare.division = 1.0;
        let root = PatternNode::group("root", 1.0, vec![bare]);
        let events = flatten(&root, 4.0, "t");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].velocity, 1.0);
        assert_eq!(events[0].pitch, 60);
        assert_eq!(events[0].id, "bare");
    }

    #[test]
    fn zero_sum_subtree_yields_nothing() {
        let root = PatternNode::group(
            "root",
            1.0,
            vec![
                hit("a", 1.0),
                PatternNode::group("dead", 1.0, vec![hit("x", 0.0), hit("y", 0.0)]),
            ],
        );
        let events = flatten(&root, 4.0, "t");
        assert_eq!(events.len(), 1, "only the healthy sibling should play");
        assert_eq!(events[0].id, "a");
    }

    #[test]
    fn zero_sum_root_yields_nothing() {
        let root = PatternNode::group("root", 1.0, vec![hit("x", 0.0)]);
        assert!(flatten(&root, 4.0, "t").is_empty());
    }

    #[test]
    fn invalid_base_meter_yields_nothing() {
        let root = PatternNode::group("root", 1.0, vec![hit("a", 1.0)]);
        assert!(flatten(&root, 0.0, "t").is_empty());
        assert!(flatten(&root, f64::NAN, "t").is_empty());
    }

    #[test]
    fn velocity_and_pitch_are_clamped() {
        let root = PatternNode::group("root", 1.0, vec![PatternNode::leaf("a", 1.0, 3.0, 200)]);
        let events = flatten(&root, 4.0, "t");
        assert_eq!(events[0].velocity, 1.0);
        assert_eq!(events[0].pitch, 127);
    }

    #[test]
    fn runaway_depth_is_cut_off() {
        let mut node = hit("bottom", 1.0);
        for i in 0..(MAX_PATTERN_DEPTH + 10) {
            node = PatternNode::group(&format!("n{i}"), 1.0, vec![node]);
        }
        assert!(flatten(&node, 4.0, "t").is_empty());
    }

    #[test]
    fn decodes_camel_case_json() {
        let json = r#"{
            "id": "root",
            "division": 1,
            "children": [
                { "id": "a", "division": 1, "velocity": 0.8, "pitch": 64 },
                { "id": "b" }
            ]
        }"#;
        let root: PatternNode = serde_json::from_str(json).unwrap();
        let events = flatten(&root, 4.0, "lead");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].pitch, 64);
        assert_eq!(events[1].time, 2.0);

        let wire = serde_json::to_value(&events[0]).unwrap();
        assert_eq!(wire["instrumentId"], "lead");
    }
}
