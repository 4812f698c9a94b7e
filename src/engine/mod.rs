//! The real-time engine: project state, scheduling, voices and mixing.
//!
//! The control plane talks to it through [`processor::ControlHandle`]; the
//! audio callback owns the [`processor::AudioProcessor`].

pub mod automation;
pub mod command;
pub mod mixer;
pub mod playback;
pub mod processor;
pub mod project;
pub mod routing;
pub mod scheduler;
pub mod synth_manager;
pub mod track_state;

pub use playback::TransportState;
pub use processor::{AudioProcessor, ControlHandle, channel};
pub use project::{ProjectManager, TriggerRecord};
