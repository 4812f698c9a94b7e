//! Feedback delay with a fractional, linearly interpolated read position.

use serde::Deserialize;

use crate::settings::{Settings, clamp_or};

/// Longest delay time the buffer holds.
pub const MAX_DELAY_SECONDS: f64 = 2.0;

/// Highest feedback accepted; 1.0 or more would never decay.
pub const MAX_FEEDBACK: f64 = 0.99;

/// A circular buffer read at fractional delays.
///
/// The buffer starts zeroed, so reading further back than has been written
/// returns silence.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f64>,
    write_pos: usize,
}

impl DelayLine {
    /// A line holding up to `max_delay_samples` of history.
    pub fn new(max_delay_samples: usize) -> Self {
        DelayLine {
            buffer: vec![0.0; max_delay_samples.max(1) + 2],
            write_pos: 0,
        }
    }

    /// Longest delay that can be read, in samples.
    pub fn max_delay(&self) -> f64 {
        (self.buffer.len() - 2) as f64
    }

    /// Read `delay` samples behind the next write, clamped to the buffer.
    #[inline]
    pub fn read(&self, delay: f64) -> f64 {
        let len = self.buffer.len();
        let delay = delay.clamp(1.0, self.max_delay());
        let whole = delay as usize;
        let frac = delay - whole as f64;

        let pos0 = (self.write_pos + len - whole) % len;
        let pos1 = (pos0 + len - 1) % len;
        let s0 = self.buffer[pos0];
        let s1 = self.buffer[pos1];
        s0 + frac * (s1 - s0)
    }

    /// Append one sample.
    #[inline]
    pub fn write(&mut self, value: f64) {
        self.buffer[self.write_pos] = value;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DelaySettings {
    /// Delay time in seconds [0.001, 2], default 0.25.
    pub time: f64,
    /// Feedback [0, 0.99], default 0.35.
    pub feedback: f64,
    /// Dry/wet mix [0, 1], default 0.3.
    pub mix: f64,
}

impl Default for DelaySettings {
    fn default() -> Self {
        DelaySettings {
            time: 0.25,
            feedback: 0.35,
            mix: 0.3,
        }
    }
}

impl Settings for DelaySettings {
    fn validated(self) -> Self {
        let d = DelaySettings::default();
        DelaySettings {
            time: clamp_or(self.time, 0.001, MAX_DELAY_SECONDS, d.time),
            feedback: clamp_or(self.feedback, 0.0, MAX_FEEDBACK, d.feedback),
            mix: clamp_or(self.mix, 0.0, 1.0, d.mix),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DelayState {
    line: DelayLine,
    sample_rate: f64,
}

impl DelayState {
    pub fn new(sample_rate: f64) -> Self {
        DelayState {
            line: DelayLine::new((MAX_DELAY_SECONDS * sample_rate).ceil() as usize),
            sample_rate,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64, settings: &DelaySettings) -> f64 {
        let delayed = self.line.read(settings.time * self.sample_rate);
        let feedback = settings.feedback.min(MAX_FEEDBACK);
        self.line.write(input + delayed * feedback);
        input * (1.0 - settings.mix) + delayed * settings.mix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_reads_whole_and_fractional_delays() {
        let mut line = DelayLine::new(16);
        for i in 0..8 {
            line.write(i as f64);
        }
        // Last written value is 7; one sample back is 7, two back is 6.
        assert_eq!(line.read(1.0), 7.0);
        assert_eq!(line.read(2.0), 6.0);
        assert_eq!(line.read(1.5), 6.5);
        // Further back than written is silence.
        assert_eq!(line.read(12.0), 0.0);
    }

    #[test]
    fn impulse_echoes_at_delay_time() {
        let sr = 44100.0;
        let mut st = DelayState::new(sr);
        let s = DelaySettings {
            time: 0.01,
            feedback: 0.5,
            mix: 1.0,
        };
        let out: Vec<f64> = (0..1400)
            .map(|i| st.process(if i == 0 { 1.0 } else { 0.0 }, &s))
            .collect();
        // 0.01 s = 441 samples.
        assert_eq!(out[0], 0.0, "fully wet output starts silent");
        assert!((out[441] - 1.0).abs() < 1e-9, "first echo, got {}", out[441]);
        assert!((out[882] - 0.5).abs() < 1e-9, "second echo, got {}", out[882]);
        assert!(out[300].abs() < 1e-12);
    }

    #[test]
    fn feedback_is_capped() {
        let s = DelaySettings {
            feedback: 5.0,
            ..Default::default()
        }
        .validated();
        assert_eq!(s.feedback, MAX_FEEDBACK);
    }
}
