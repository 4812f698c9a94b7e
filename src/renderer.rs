//! Offline renderer: drives the real-time processor block by block and
//! encodes the result as WAV.

use crate::config::EngineConfig;
use crate::dsp::wavetable::WavetableBank;
use crate::engine::playback::TransportState;
use crate::engine::processor::channel;
use crate::error::EngineError;
use crate::messages::{ControlMessage, ProjectDescriptor};

/// Frames per processor call, matching a Web Audio render quantum.
pub const BLOCK_FRAMES: usize = 128;

/// Render `seconds` of `project` from beat zero. Returns (left, right).
pub fn render_project(
    project: &ProjectDescriptor,
    seconds: f64,
    config: &EngineConfig,
) -> Result<(Vec<f32>, Vec<f32>), EngineError> {
    render_project_with_bank(project, WavetableBank::new(), seconds, config)
}

/// Like [`render_project`], with samples available to the wavetable voices.
pub fn render_project_with_bank(
    project: &ProjectDescriptor,
    bank: WavetableBank,
    seconds: f64,
    config: &EngineConfig,
) -> Result<(Vec<f32>, Vec<f32>), EngineError> {
    let config = config.clone().validated();
    let frames = if seconds.is_finite() && seconds > 0.0 {
        (seconds * config.sample_rate).round() as usize
    } else {
        0
    };

    let (mut processor, mut control) = channel(config);
    control.set_wavetables(bank)?;
    control.send(ControlMessage::LoadProject(project.clone()))?;
    control.send(ControlMessage::SetTransport {
        state: TransportState::Playing,
        position_beats: 0.0,
    })?;

    let mut left = vec![0.0f32; frames];
    let mut right = vec![0.0f32; frames];
    for (l, r) in left
        .chunks_mut(BLOCK_FRAMES)
        .zip(right.chunks_mut(BLOCK_FRAMES))
    {
        processor.process(l, r);
    }
    Ok((left, right))
}

/// Render `project` to 16-bit stereo WAV bytes.
pub fn render_wav(
    project: &ProjectDescriptor,
    seconds: f64,
    config: &EngineConfig,
) -> Result<Vec<u8>, EngineError> {
    let (left, right) = render_project(project, seconds, config)?;
    let pcm: Vec<i16> = left
        .iter()
        .zip(&right)
        .flat_map(|(&l, &r)| [to_i16(l), to_i16(r)])
        .collect();
    Ok(encode_wav(&pcm, config.sample_rate.round() as u32, 2))
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Encode interleaved i16 PCM samples to a WAV byte buffer.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);
    let data_size = (samples.len() * 2) as u32;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_size).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::wavetable::DrumCategory;
    use serde_json::json;

    fn project(instrument: &str) -> ProjectDescriptor {
        serde_json::from_value(json!({
            "bpm": 120,
            "tracks": [{
                "id": "t",
                "type": instrument,
                "pattern": { "id": "r", "children": [{ "id": "a" }, { "id": "b" }] }
            }]
        }))
        .unwrap()
    }

    #[test]
    fn wav_header_valid() {
        let wav = render_wav(&project("kick"), 0.5, &EngineConfig::default()).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        let sr = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(sr, 44100);
        let ch = u16::from_le_bytes([wav[22], wav[23]]);
        assert_eq!(ch, 2);
    }

    #[test]
    fn wav_size_correct() {
        let wav = render_wav(&project("kick"), 0.5, &EngineConfig::default()).unwrap();
        // 22050 frames * 2 channels * 2 bytes
        let data_size = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_size, 88200);
        assert_eq!(wav.len(), 44 + 88200);
    }

    #[test]
    fn rendered_audio_is_not_silent() {
        let wav = render_wav(&project("snare"), 0.25, &EngineConfig::default()).unwrap();
        let has_nonzero = wav[44..]
            .chunks_exact(2)
            .any(|b| i16::from_le_bytes([b[0], b[1]]) != 0);
        assert!(has_nonzero, "rendered WAV should contain non-silent audio");
    }

    #[test]
    fn render_is_deterministic() {
        let config = EngineConfig::default();
        let a = render_project(&project("hihat"), 0.2, &config).unwrap();
        let b = render_project(&project("hihat"), 0.2, &config).unwrap();
        assert_eq!(a, b, "seeded noise must render identically");
    }

    #[test]
    fn wavetable_voice_uses_supplied_bank() {
        let config = EngineConfig::default();
        let silent = render_project(&project("sampled-kick"), 0.1, &config).unwrap();
        assert!(silent.0.iter().all(|&s| s == 0.0), "no sample, no sound");

        let mut bank = WavetableBank::new();
        let tone: Vec<f32> = (0..4410).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        bank.insert(DrumCategory::Kick, "sine", tone);
        let (left, _) = render_project_with_bank(&project("sampled-kick"), bank, 0.1, &config).unwrap();
        assert!(left.iter().any(|s| s.abs() > 0.01));
    }

    #[test]
    fn invalid_project_is_rejected() {
        let mut p = project("kick");
        p.bpm = f64::NAN;
        assert!(matches!(
            render_project(&p, 0.1, &EngineConfig::default()),
            Err(EngineError::InvalidTempo(_))
        ));
    }

    #[test]
    fn non_positive_duration_renders_nothing() {
        let (left, right) = render_project(&project("kick"), -1.0, &EngineConfig::default()).unwrap();
        assert!(left.is_empty() && right.is_empty());
    }
}
