//! Typed settings decoded from the control plane's key/value bags.
//!
//! Each instrument and effect has its own settings struct. A struct is
//! decoded once when a message is accepted, clamped by [`Settings::validated`],
//! and never re-checked on the audio path.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::EngineError;

/// A settings struct with documented defaults and ranges.
pub trait Settings: DeserializeOwned + Default {
    /// Clamp every field into its documented range.
    fn validated(self) -> Self;
}

/// Decode `value` into `T`. `null` yields the defaults.
pub fn parse_settings<T: Settings>(target: &str, value: &Value) -> Result<T, EngineError> {
    if value.is_null() {
        return Ok(T::default());
    }
    let parsed: T =
        serde_json::from_value(value.clone()).map_err(|source| EngineError::InvalidSettings {
            target: target.to_string(),
            source,
        })?;
    Ok(parsed.validated())
}

/// Clamp to `[lo, hi]`, replacing non-finite input with `default`.
#[inline]
pub fn clamp_or(value: f64, lo: f64, hi: f64, default: f64) -> f64 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default, rename_all = "camelCase")]
    struct Knob {
        gain_db: f64,
    }

    impl Default for Knob {
        fn default() -> Self {
            Knob { gain_db: -6.0 }
        }
    }

    impl Settings for Knob {
        fn validated(self) -> Self {
            Knob {
                gain_db: clamp_or(self.gain_db, -24.0, 24.0, -6.0),
            }
        }
    }

    #[test]
    fn null_means_defaults() {
        let k: Knob = parse_settings("knob", &Value::Null).unwrap();
        assert_eq!(k, Knob::default());
    }

    #[test]
    fn missing_fields_take_defaults_and_values_are_clamped() {
        let k: Knob = parse_settings("knob", &json!({})).unwrap();
        assert_eq!(k.gain_db, -6.0);
        let k: Knob = parse_settings("knob", &json!({ "gainDb": 100.0 })).unwrap();
        assert_eq!(k.gain_db, 24.0);
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = parse_settings::<Knob>("knob", &json!({ "gainDb": "loud" })).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSettings { .. }));
    }

    #[test]
    fn clamp_or_replaces_nan() {
        assert_eq!(clamp_or(f64::NAN, 0.0, 1.0, 0.25), 0.25);
        assert_eq!(clamp_or(2.0, 0.0, 1.0, 0.25), 1.0);
    }
}
