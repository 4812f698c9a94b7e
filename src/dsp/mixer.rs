//! Mixer: constant-power panning and the stereo master bus.

use std::f64::consts::FRAC_PI_4;

/// Left/right gains for `pan` in [-1, 1] (constant power).
#[inline]
pub fn pan_gains(pan: f64) -> (f64, f64) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// A stereo summing bus with master gain and soft clipping.
#[derive(Debug, Clone)]
pub struct MasterBus {
    pub master_gain: f64,
    left: f64,
    right: f64,
}

impl MasterBus {
    pub fn new(master_gain: f64) -> Self {
        MasterBus {
            master_gain,
            left: 0.0,
            right: 0.0,
        }
    }

    /// Start a new output frame.
    #[inline]
    pub fn clear(&mut self) {
        self.left = 0.0;
        self.right = 0.0;
    }

    /// Add a mono signal at `pan`.
    #[inline]
    pub fn add(&mut self, sample: f64, pan: f64) {
        let (l, r) = pan_gains(pan);
        self.left += sample * l;
        self.right += sample * r;
    }

    /// The mixed frame, with master gain and soft clipping applied.
    #[inline]
    pub fn output(&self) -> (f64, f64) {
        (
            soft_clip(self.left * self.master_gain),
            soft_clip(self.right * self.master_gain),
        )
    }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
#[inline]
pub fn soft_clip(x: f64) -> f64 {
    x.tanh()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_frame_is_silent() {
        let bus = MasterBus::new(0.8);
        assert_eq!(bus.output(), (0.0, 0.0));
    }

    #[test]
    fn accumulates_samples() {
        let mut bus = MasterBus::new(1.0);
        bus.add(0.5, -1.0);
        bus.add(0.3, -1.0);
        let (l, r) = bus.output();
        assert!((l - soft_clip(0.8)).abs() < 1e-10);
        assert!(r.abs() < 1e-10);

        bus.clear();
        assert_eq!(bus.output(), (0.0, 0.0));
    }

    #[test]
    fn soft_clip_prevents_overflow() {
        let mut bus = MasterBus::new(1.0);
        bus.add(100.0, 0.0);
        let (l, r) = bus.output();
        assert!(l.abs() <= 1.0 && r.abs() <= 1.0, "Soft clip should keep output <= 1.0");
    }

    #[test]
    fn pan_law_is_constant_power() {
        for pan in [-1.0, -0.5, 0.0, 0.3, 1.0] {
            let (l, r) = pan_gains(pan);
            assert!((l * l + r * r - 1.0).abs() < 1e-12, "power at {pan}");
        }
        let (l, r) = pan_gains(0.0);
        assert!((l - r).abs() < 1e-12);
        let (l, r) = pan_gains(1.0);
        assert!(l.abs() < 1e-12 && (r - 1.0).abs() < 1e-12);
        assert_eq!(pan_gains(7.0), pan_gains(1.0));
    }
}
