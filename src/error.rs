use thiserror::Error;

/// Errors reported at the control-plane boundary.
///
/// The audio callback never produces these; anything that goes wrong while
/// rendering is clamped or ignored in place.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid tempo {0} (must be a finite number of beats per minute above zero)")]
    InvalidTempo(f64),
    #[error("Invalid settings for {target}: {source}")]
    InvalidSettings {
        target: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid control message: {0}")]
    InvalidMessage(String),
    #[error("Duplicate track id '{0}'")]
    DuplicateTrack(String),
    #[error("Command queue is full")]
    QueueFull,
    #[error("Audio processor has been dropped")]
    Disconnected,
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::InvalidMessage(e.to_string())
    }
}

impl From<serde_wasm_bindgen::Error> for EngineError {
    fn from(e: serde_wasm_bindgen::Error) -> Self {
        EngineError::InvalidMessage(e.to_string())
    }
}
