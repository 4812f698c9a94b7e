//! Distortion: drive-scaled tanh with a hard-clip blend at high drive.

use serde::Deserialize;

use super::drive_stage;
use crate::settings::{Settings, clamp_or};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DistortionSettings {
    /// Normalized drive [0, 1]. Default 0.4.
    pub drive: f64,
    /// Wet amount [0, 1]. Default 0.5.
    pub amount: f64,
}

impl Default for DistortionSettings {
    fn default() -> Self {
        DistortionSettings {
            drive: 0.4,
            amount: 0.5,
        }
    }
}

impl Settings for DistortionSettings {
    fn validated(self) -> Self {
        let d = DistortionSettings::default();
        DistortionSettings {
            drive: clamp_or(self.drive, 0.0, 1.0, d.drive),
            amount: clamp_or(self.amount, 0.0, 1.0, d.amount),
        }
    }
}

/// Distortion is memoryless.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistortionState;

impl DistortionState {
    #[inline]
    pub fn process(&mut self, input: f64, settings: &DistortionSettings) -> f64 {
        let wet = drive_stage(input, settings.drive);
        input * (1.0 - settings.amount) + wet * settings.amount
    }
}
