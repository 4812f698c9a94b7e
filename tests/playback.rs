use serde_json::json;
use treeseq_core::config::EngineConfig;
use treeseq_core::engine::{AudioProcessor, ControlHandle, TransportState, channel};
use treeseq_core::messages::ControlMessage;

const BLOCK: usize = 128;

fn engine(project: serde_json::Value) -> (AudioProcessor, ControlHandle) {
    let (mut processor, mut control) = channel(EngineConfig::default());
    processor.project_mut().enable_trigger_log();
    let mut msg = project;
    msg["type"] = json!("loadProject");
    control.post_json(&msg.to_string()).expect("project loads");
    control
        .send(ControlMessage::SetTransport {
            state: TransportState::Playing,
            position_beats: 0.0,
        })
        .expect("transport");
    (processor, control)
}

fn render(processor: &mut AudioProcessor, frames: usize) -> (Vec<f32>, Vec<f32>) {
    let mut left = vec![0.0f32; frames];
    let mut right = vec![0.0f32; frames];
    for (l, r) in left.chunks_mut(BLOCK).zip(right.chunks_mut(BLOCK)) {
        processor.process(l, r);
    }
    (left, right)
}

fn trigger_frames(processor: &mut AudioProcessor) -> Vec<(u64, String)> {
    processor
        .project_mut()
        .take_triggers()
        .into_iter()
        .map(|t| (t.frame, t.event_id.to_string()))
        .collect()
}

#[test]
fn two_equal_leaves_fire_one_second_apart() {
    let (mut p, _ctl) = engine(json!({
        "bpm": 120,
        "tracks": [{
            "id": "kick", "type": "kick", "baseMeter": 4,
            "pattern": { "id": "root", "children": [{ "id": "L1" }, { "id": "L2" }] }
        }]
    }));
    render(&mut p, 44_100 + BLOCK);
    assert_eq!(
        trigger_frames(&mut p),
        vec![(0, "L1".to_string()), (44_100, "L2".to_string())]
    );
}

#[test]
fn no_event_fires_twice_across_blocks_and_lookahead() {
    // Sixteen sixteenths, rendered in odd-sized blocks.
    let children: Vec<_> = (0..16).map(|i| json!({ "id": format!("s{i}") })).collect();
    let (mut p, _ctl) = engine(json!({
        "bpm": 137,
        "tracks": [{ "id": "hat", "type": "hihat", "pattern": { "id": "r", "children": children } }]
    }));
    let mut left = vec![0.0f32; 97];
    let mut right = vec![0.0f32; 97];
    // A little under one four-beat loop.
    let loop_frames = (4.0 * 44_100.0 * 60.0 / 137.0) as usize;
    for _ in 0..(loop_frames / 97) {
        p.process(&mut left, &mut right);
    }
    let fired = trigger_frames(&mut p);
    assert_eq!(fired.len(), 16);
    let mut ids: Vec<_> = fired.iter().map(|(_, id)| id.clone()).collect();
    ids.dedup();
    assert_eq!(ids.len(), 16, "every leaf fires exactly once");
    assert!(fired.windows(2).all(|w| w[0].0 < w[1].0));
}

#[test]
fn solo_takes_precedence_over_unsoloed_tracks() {
    let project = json!({
        "bpm": 120,
        "tracks": [
            { "id": "a", "type": "kick", "pattern": { "id": "r", "children": [{ "id": "a1" }] } },
            { "id": "b", "type": "snare", "pattern": { "id": "r", "children": [{ "id": "b1" }] } }
        ]
    });

    let (mut p, mut ctl) = engine(project);
    ctl.send(ControlMessage::UpdateTrackSolo {
        track_id: "a".to_string(),
        value: true,
    })
    .unwrap();
    let (solo_left, _) = render(&mut p, 4096);

    let (mut only, _ctl) = engine(json!({
        "bpm": 120,
        "tracks": [
            { "id": "a", "type": "kick", "pattern": { "id": "r", "children": [{ "id": "a1" }] } }
        ]
    }));
    let (only_left, _) = render(&mut only, 4096);

    assert_eq!(solo_left, only_left, "soloing a sounds exactly like a alone");
}

#[test]
fn engine_produces_bounded_audio() {
    let (mut p, _ctl) = engine(json!({
        "bpm": 128,
        "tracks": [
            { "id": "k", "type": "kick", "volume": 4, "pattern": { "id": "r", "children": [{ "id": "k1" }, { "id": "k2" }] } },
            { "id": "s", "type": "synth", "pan": -1, "effectIds": ["rev", "dist"],
              "settings": { "waveform": "sawtooth" },
              "pattern": { "id": "r", "children": [{ "id": "s1", "pitch": 48 }, { "id": "s2", "pitch": 55 }] } }
        ],
        "effects": [
            { "id": "rev", "type": "reverb" },
            { "id": "dist", "type": "distortion" }
        ]
    }));
    let (left, right) = render(&mut p, 44_100);
    assert!(left.iter().any(|s| s.abs() > 0.05));
    assert!(
        left.iter().chain(&right).all(|s| s.is_finite() && s.abs() <= 1.0),
        "soft clip keeps output in range"
    );
}

#[test]
fn live_edits_apply_without_reload() {
    let (mut p, mut ctl) = engine(json!({
        "bpm": 120,
        "tracks": [{ "id": "t", "type": "kick", "pattern": { "id": "r", "children": [{ "id": "x" }] } }]
    }));
    render(&mut p, 1024);
    trigger_frames(&mut p);

    ctl.post_json(
        &json!({
            "type": "updatePatternTree",
            "trackId": "t",
            "baseMeter": 4,
            "tree": { "id": "r", "children": [{ "id": "y" }, { "id": "z" }] }
        })
        .to_string(),
    )
    .unwrap();
    ctl.send(ControlMessage::UpdateTrackVolume {
        track_id: "t".to_string(),
        value: 0.5,
    })
    .unwrap();

    render(&mut p, 44_100);
    let ids: Vec<String> = trigger_frames(&mut p).into_iter().map(|(_, id)| id).collect();
    assert_eq!(ids, vec!["z".to_string()]);
}

#[test]
fn position_reports_reach_the_control_side() {
    let (mut p, ctl) = engine(json!({
        "bpm": 120,
        "tracks": [{ "id": "t", "type": "clap", "pattern": { "id": "r", "children": [{ "id": "c" }] } }]
    }));
    render(&mut p, 4096);
    let pos = ctl.poll_position().expect("a report every 1/30 s");
    assert!(pos.time_in_beats > 0.0 && pos.time_in_beats < 4096.0 / 22_050.0 + 1e-9);
    assert_eq!(pos.active_event_ids, vec!["c".to_string()]);
}

#[test]
fn update_track_mid_play_keeps_scheduled_notes_and_events() {
    let (mut p, mut ctl) = engine(json!({
        "bpm": 120,
        "tracks": [{
            "id": "kick", "type": "kick", "baseMeter": 4,
            "pattern": { "id": "root", "children": [{ "id": "L1" }, { "id": "L2" }] }
        }],
        "events": [{ "id": "once", "time": 2.5, "instrumentId": "kick" }]
    }));
    render(&mut p, 40_064);
    trigger_frames(&mut p);

    ctl.post_json(
        &json!({
            "type": "updateTrack",
            "trackId": "kick",
            "track": {
                "id": "kick", "type": "snare", "baseMeter": 4,
                "pattern": { "id": "root", "children": [{ "id": "L1" }, { "id": "L2" }] }
            }
        })
        .to_string(),
    )
    .unwrap();
    render(&mut p, 22_050);
    assert_eq!(
        trigger_frames(&mut p),
        vec![(44_100, "L2".to_string()), (55_125, "once".to_string())]
    );
}
