pub mod arena;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod messages;
pub mod pattern;
pub mod renderer;
pub mod settings;

use crate::config::EngineConfig;
use crate::engine::processor::{AudioProcessor, ControlHandle, channel};
use crate::error::EngineError;
use crate::messages::{ControlMessage, ProjectDescriptor};
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the treeseq-core version string.
#[wasm_bindgen(js_name = coreVersion)]
pub fn core_version() -> String {
    VERSION.to_string()
}

fn js_error(e: EngineError) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

/// WASM-exposed engine for an AudioWorklet: both halves of the channel live
/// on the worklet thread, messages from the main thread go through
/// `postMessage`.
#[wasm_bindgen]
pub struct WorkletEngine {
    processor: AudioProcessor,
    control: ControlHandle,
}

#[wasm_bindgen]
impl WorkletEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64) -> WorkletEngine {
        let (processor, control) = channel(EngineConfig::with_sample_rate(sample_rate));
        WorkletEngine { processor, control }
    }

    /// Decode a control message object and queue it for the next block.
    #[wasm_bindgen(js_name = postMessage)]
    pub fn post_message(&mut self, msg: JsValue) -> Result<(), JsValue> {
        let msg: ControlMessage =
            serde_wasm_bindgen::from_value(msg).map_err(|e| js_error(e.into()))?;
        self.control.send(msg).map_err(js_error)
    }

    #[wasm_bindgen(js_name = registerWavetable)]
    pub fn register_wavetable(
        &mut self,
        category: &str,
        name: &str,
        data: Vec<f32>,
    ) -> Result<(), JsValue> {
        self.control
            .register_wavetable(category, name, data)
            .map_err(js_error)
    }

    /// Render one block into the two output channels.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.processor.process(left, right);
    }

    /// Latest playback position, or `null` when none arrived.
    #[wasm_bindgen(js_name = pollPosition)]
    pub fn poll_position(&self) -> JsValue {
        self.control
            .poll_position()
            .and_then(|pos| serde_wasm_bindgen::to_value(&pos).ok())
            .unwrap_or(JsValue::NULL)
    }
}

/// WASM-exposed: render a project object to 16-bit stereo WAV bytes.
#[wasm_bindgen(js_name = renderProjectWav)]
pub fn render_project_wav(
    project: JsValue,
    seconds: f64,
    sample_rate: f64,
) -> Result<Vec<u8>, JsValue> {
    let project: ProjectDescriptor =
        serde_wasm_bindgen::from_value(project).map_err(|e| js_error(e.into()))?;
    renderer::render_wav(&project, seconds, &EngineConfig::with_sample_rate(sample_rate))
        .map_err(js_error)
}
