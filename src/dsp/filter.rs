//! Biquad filter design and state.
//!
//! Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson),
//! run in Direct Form II Transposed.

use std::f64::consts::PI;

/// Filter response type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
    Bell,
    LowShelf,
    HighShelf,
}

impl FilterType {
    /// Parse a wire tag. Accepts the usual aliases.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "lowpass" | "lp" => Some(FilterType::Lowpass),
            "highpass" | "hp" => Some(FilterType::Highpass),
            "bandpass" | "bp" => Some(FilterType::Bandpass),
            "notch" => Some(FilterType::Notch),
            "bell" | "peaking" | "peak" => Some(FilterType::Bell),
            "lowshelf" | "low-shelf" => Some(FilterType::LowShelf),
            "highshelf" | "high-shelf" => Some(FilterType::HighShelf),
            _ => None,
        }
    }

    /// Pass types shape the spectrum by removing content rather than by a
    /// gain parameter.
    pub fn is_pass(self) -> bool {
        matches!(
            self,
            FilterType::Lowpass | FilterType::Highpass | FilterType::Bandpass
        )
    }
}

/// Normalized biquad coefficients (`a0` divided out).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoefficients {
    /// Passes the input through unchanged.
    pub const IDENTITY: BiquadCoefficients = BiquadCoefficients {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Design a filter. Frequency is clamped below Nyquist, Q above zero.
    pub fn design(
        filter_type: FilterType,
        frequency: f64,
        q: f64,
        gain_db: f64,
        sample_rate: f64,
    ) -> Self {
        let frequency = frequency.clamp(10.0, sample_rate * 0.49);
        let q = q.max(0.01);
        let w0 = 2.0 * PI * frequency / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);
        let a_lin = 10.0_f64.powf(gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            FilterType::Lowpass => {
                let b1 = 1.0 - cos_w0;
                let b0 = b1 / 2.0;
                (b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterType::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                let b1 = -(1.0 + cos_w0);
                (b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterType::Bandpass => (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha),
            FilterType::Notch => (
                1.0,
                -2.0 * cos_w0,
                1.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterType::Bell => (
                1.0 + alpha * a_lin,
                -2.0 * cos_w0,
                1.0 - alpha * a_lin,
                1.0 + alpha / a_lin,
                -2.0 * cos_w0,
                1.0 - alpha / a_lin,
            ),
            FilterType::LowShelf => {
                let sq = 2.0 * a_lin.sqrt() * alpha;
                (
                    a_lin * ((a_lin + 1.0) - (a_lin - 1.0) * cos_w0 + sq),
                    2.0 * a_lin * ((a_lin - 1.0) - (a_lin + 1.0) * cos_w0),
                    a_lin * ((a_lin + 1.0) - (a_lin - 1.0) * cos_w0 - sq),
                    (a_lin + 1.0) + (a_lin - 1.0) * cos_w0 + sq,
                    -2.0 * ((a_lin - 1.0) + (a_lin + 1.0) * cos_w0),
                    (a_lin + 1.0) + (a_lin - 1.0) * cos_w0 - sq,
                )
            }
            FilterType::HighShelf => {
                let sq = 2.0 * a_lin.sqrt() * alpha;
                (
                    a_lin * ((a_lin + 1.0) + (a_lin - 1.0) * cos_w0 + sq),
                    -2.0 * a_lin * ((a_lin - 1.0) + (a_lin + 1.0) * cos_w0),
                    a_lin * ((a_lin + 1.0) + (a_lin - 1.0) * cos_w0 - sq),
                    (a_lin + 1.0) - (a_lin - 1.0) * cos_w0 + sq,
                    2.0 * ((a_lin - 1.0) - (a_lin + 1.0) * cos_w0),
                    (a_lin + 1.0) - (a_lin - 1.0) * cos_w0 - sq,
                )
            }
        };

        BiquadCoefficients {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Filter history for one channel.
#[derive(Debug, Clone)]
pub struct Biquad {
    coeffs: BiquadCoefficients,
    z1: f64,
    z2: f64,
}

impl Default for Biquad {
    fn default() -> Self {
        Biquad::new(BiquadCoefficients::IDENTITY)
    }
}

impl Biquad {
    pub fn new(coeffs: BiquadCoefficients) -> Self {
        Biquad {
            coeffs,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Swap coefficients, keeping history so parameter sweeps stay smooth.
    pub fn set_coefficients(&mut self, coeffs: BiquadCoefficients) {
        self.coeffs = coeffs;
    }

    pub fn coefficients(&self) -> BiquadCoefficients {
        self.coeffs
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let c = &self.coeffs;
        let output = c.b0 * input + self.z1;
        self.z1 = c.b1 * input - c.a1 * output + self.z2;
        self.z2 = c.b2 * input - c.a2 * output;
        if !output.is_finite() {
            // An unstable parameter jump must not poison the history forever.
            self.reset();
            return 0.0;
        }
        output
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// A biquad that owns its design parameters and redesigns lazily.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    pub filter_type: FilterType,
    pub frequency: f64,
    pub q: f64,
    /// Only used by bell and shelf types.
    pub gain_db: f64,
    sample_rate: f64,
    biquad: Biquad,
    dirty: bool,
}

impl BiquadFilter {
    pub fn new(filter_type: FilterType, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            filter_type,
            frequency: 1000.0,
            q: std::f64::consts::FRAC_1_SQRT_2, // Butterworth
            gain_db: 0.0,
            sample_rate,
            biquad: Biquad::default(),
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    pub fn update_coefficients(&mut self) {
        self.biquad.set_coefficients(BiquadCoefficients::design(
            self.filter_type,
            self.frequency,
            self.q,
            self.gain_db,
            self.sample_rate,
        ));
        self.dirty = false;
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }
        self.biquad.process(input)
    }

    pub fn reset(&mut self) {
        self.biquad.reset();
    }

    /// Set frequency and mark coefficients dirty when it changed.
    pub fn set_frequency(&mut self, freq: f64) {
        if freq != self.frequency {
            self.frequency = freq;
            self.dirty = true;
        }
    }

    /// Set Q and mark coefficients dirty when it changed.
    pub fn set_q(&mut self, q: f64) {
        if q != self.q {
            self.q = q;
            self.dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 44100.0;

    fn settle(coeffs: BiquadCoefficients, input: f64, n: usize) -> f64 {
        let mut bq = Biquad::new(coeffs);
        let mut out = 0.0;
        for _ in 0..n {
            out = bq.process(input);
        }
        out
    }

    fn peak_response(coeffs: BiquadCoefficients, freq: f64) -> f64 {
        let mut bq = Biquad::new(coeffs);
        let mut max_out = 0.0_f64;
        for i in 0..8820 {
            let x = (2.0 * PI * freq * i as f64 / SR).sin();
            let y = bq.process(x);
            if i > 4410 {
                max_out = max_out.max(y.abs());
            }
        }
        max_out
    }

    #[test]
    fn lowpass_passes_dc() {
        let c = BiquadCoefficients::design(FilterType::Lowpass, 5000.0, 0.707, 0.0, SR);
        let out = settle(c, 1.0, 1000);
        assert!((out - 1.0).abs() < 0.001, "Lowpass should pass DC, got {out}");
    }

    #[test]
    fn highpass_blocks_dc() {
        let c = BiquadCoefficients::design(FilterType::Highpass, 1000.0, 0.707, 0.0, SR);
        let out = settle(c, 1.0, 1000);
        assert!(out.abs() < 0.001, "Highpass should block DC, got {out}");
    }

    #[test]
    fn lowpass_attenuates_high_freq() {
        let c = BiquadCoefficients::design(FilterType::Lowpass, 200.0, 0.707, 0.0, SR);
        let amp = peak_response(c, 10000.0);
        assert!(amp < 0.01, "Lowpass@200Hz should strongly attenuate 10kHz, got {amp}");
    }

    #[test]
    fn notch_removes_center() {
        let c = BiquadCoefficients::design(FilterType::Notch, 1000.0, 2.0, 0.0, SR);
        let amp = peak_response(c, 1000.0);
        assert!(amp < 0.05, "Notch should cancel its center, got {amp}");
    }

    #[test]
    fn bell_boosts_center() {
        let c = BiquadCoefficients::design(FilterType::Bell, 1000.0, 1.0, 6.0, SR);
        let amp = peak_response(c, 1000.0);
        let expected = 10.0_f64.powf(6.0 / 20.0);
        assert!((amp - expected).abs() < 0.05, "expected ~{expected}, got {amp}");
    }

    #[test]
    fn low_shelf_sets_dc_gain() {
        let c = BiquadCoefficients::design(FilterType::LowShelf, 200.0, 0.707, -6.0, SR);
        let out = settle(c, 1.0, 5000);
        let expected = 10.0_f64.powf(-6.0 / 20.0);
        assert!((out - expected).abs() < 0.01, "expected {expected}, got {out}");
    }

    #[test]
    fn high_shelf_leaves_dc_alone() {
        let c = BiquadCoefficients::design(FilterType::HighShelf, 3000.0, 0.707, 9.0, SR);
        let out = settle(c, 1.0, 5000);
        assert!((out - 1.0).abs() < 0.01, "High shelf DC gain should be unity, got {out}");
        let amp = peak_response(c, 15000.0);
        assert!(amp > 2.0, "High shelf should lift the top end, got {amp}");
    }

    #[test]
    fn identity_is_transparent() {
        let mut bq = Biquad::default();
        for x in [0.3, -0.7, 1.0, 0.0] {
            assert_eq!(bq.process(x), x);
        }
    }

    #[test]
    fn filter_output_finite() {
        let mut f = BiquadFilter::new(FilterType::Bandpass, SR);
        f.set_frequency(30000.0); // above Nyquist, clamped
        for i in 0..10000 {
            let input = if i % 100 == 0 { 1.0 } else { 0.0 };
            let out = f.process(input);
            assert!(out.is_finite(), "Filter output not finite at sample {i}");
        }
    }

    #[test]
    fn tags_parse() {
        assert_eq!(FilterType::from_tag("peaking"), Some(FilterType::Bell));
        assert_eq!(FilterType::from_tag("highshelf"), Some(FilterType::HighShelf));
        assert_eq!(FilterType::from_tag("wobble"), None);
        assert!(FilterType::Bandpass.is_pass());
        assert!(!FilterType::Notch.is_pass());
    }
}
