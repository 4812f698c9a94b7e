//! Chorus effect: one delay line swept by a sine LFO.

use std::f64::consts::PI;

use serde::Deserialize;

use super::delay::DelayLine;
use crate::settings::{Settings, clamp_or};

/// Buffer length: max delay + max depth + margin.
const MAX_DELAY_SECONDS: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChorusSettings {
    /// LFO rate in Hz [0.05, 10]. Default 1.5.
    pub rate: f64,
    /// Sweep depth in seconds [0, 0.01]. Default 0.002.
    pub depth: f64,
    /// Centre delay in seconds [0.001, 0.035]. Default 0.015.
    pub delay: f64,
    /// Dry/wet mix [0, 1]. Default 0.5.
    pub mix: f64,
}

impl Default for ChorusSettings {
    fn default() -> Self {
        ChorusSettings {
            rate: 1.5,
            depth: 0.002,
            delay: 0.015,
            mix: 0.5,
        }
    }
}

impl Settings for ChorusSettings {
    fn validated(self) -> Self {
        let d = ChorusSettings::default();
        ChorusSettings {
            rate: clamp_or(self.rate, 0.05, 10.0, d.rate),
            depth: clamp_or(self.depth, 0.0, 0.01, d.depth),
            delay: clamp_or(self.delay, 0.001, 0.035, d.delay),
            mix: clamp_or(self.mix, 0.0, 1.0, d.mix),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChorusState {
    line: DelayLine,
    sample_rate: f64,
    phase: f64,
}

impl ChorusState {
    pub fn new(sample_rate: f64) -> Self {
        ChorusState {
            line: DelayLine::new((sample_rate * MAX_DELAY_SECONDS).ceil() as usize),
            sample_rate,
            phase: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64, settings: &ChorusSettings) -> f64 {
        self.line.write(input);

        let lfo = (2.0 * PI * self.phase).sin();
        self.phase += settings.rate / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        // Depth moves the read position, so it changes delay, not only pitch.
        let delay = (settings.delay + settings.depth * lfo) * self.sample_rate;
        let wet = self.line.read(delay + 1.0);

        input * (1.0 - settings.mix) + wet * settings.mix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_depth_it_is_a_plain_delay() {
        let sr = 44100.0;
        let mut st = ChorusState::new(sr);
        let s = ChorusSettings {
            depth: 0.0,
            delay: 0.01,
            mix: 1.0,
            ..Default::default()
        };
        let out: Vec<f64> = (0..600)
            .map(|i| st.process(if i == 0 { 1.0 } else { 0.0 }, &s))
            .collect();
        let peak = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(441));
    }

    #[test]
    fn depth_sweeps_the_delay() {
        let sr = 44100.0;
        let s = ChorusSettings {
            rate: 5.0,
            depth: 0.005,
            mix: 1.0,
            ..Default::default()
        };
        let mut swept = ChorusState::new(sr);
        let mut fixed = ChorusState::new(sr);
        let still = ChorusSettings { depth: 0.0, ..s.clone() };
        let input: Vec<f64> = (0..8820).map(|i| (i as f64 * 0.05).sin()).collect();
        let differs = input
            .iter()
            .any(|&x| (swept.process(x, &s) - fixed.process(x, &still)).abs() > 0.01);
        assert!(differs);
    }
}
