//! The audio-thread half of the engine and the control handle that feeds it.
//!
//! [`channel`] builds both ends. The control side decodes messages into
//! commands and pushes them onto a bounded queue; the processor drains the
//! queue at the start of every block and sends position reports back, along
//! with the effect states its routes no longer use.

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use log::{debug, warn};

use crate::config::EngineConfig;
use crate::dsp::effects::EffectState;
use crate::dsp::wavetable::{DrumCategory, WavetableBank};
use crate::engine::command::{Command, CommandTranslator};
use crate::engine::project::ProjectManager;
use crate::error::EngineError;
use crate::messages::{ControlMessage, PlaybackPosition};

/// Build a connected processor and control handle.
pub fn channel(config: EngineConfig) -> (AudioProcessor, ControlHandle) {
    let config = config.validated();
    let (command_tx, command_rx) = bounded(config.queue_capacity);
    let (position_tx, position_rx) = bounded(config.position_queue_capacity);
    let (retired_tx, retired_rx) = bounded(config.queue_capacity);
    let sample_rate = config.sample_rate;

    let processor = AudioProcessor {
        position_interval: config.position_interval_samples(),
        since_position: 0,
        project: ProjectManager::new(config),
        commands: command_rx,
        positions: position_tx,
        retired: retired_tx,
    };
    let handle = ControlHandle {
        commands: command_tx,
        positions: position_rx,
        retired: retired_rx,
        translator: CommandTranslator::new(sample_rate),
    };
    (processor, handle)
}

// ── Audio side ──────────────────────────────────────────────

pub struct AudioProcessor {
    project: ProjectManager,
    commands: Receiver<Command>,
    positions: Sender<PlaybackPosition>,
    retired: Sender<Vec<EffectState>>,
    position_interval: u64,
    since_position: u64,
}

impl AudioProcessor {
    /// Apply queued commands, then render one block.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.project.apply(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!(target: "treeseq::processor", "control handle dropped");
                    break;
                }
            }
        }
        self.send_retired();

        self.project.render(left, right);

        if !self.project.playback().is_playing() {
            self.since_position = 0;
            return;
        }
        self.since_position += left.len().min(right.len()) as u64;
        if self.since_position >= self.position_interval {
            self.since_position = 0;
            // A full queue means nobody is reading; drop the report.
            let _ = self.positions.try_send(self.project.position());
        }
    }

    fn send_retired(&mut self) {
        let retired = self.project.take_retired();
        if retired.is_empty() {
            return;
        }
        if let Err(e) = self.retired.try_send(retired) {
            // Nobody to hand them to; they are dropped here.
            debug!(target: "treeseq::processor", "dropping {} retired effect states", e.into_inner().len());
        }
    }

    /// Apply a command directly, bypassing the queue.
    pub fn apply(&mut self, command: Command) {
        self.project.apply(command);
    }

    pub fn project(&self) -> &ProjectManager {
        &self.project
    }

    pub fn project_mut(&mut self) -> &mut ProjectManager {
        &mut self.project
    }
}

// ── Control side ────────────────────────────────────────────

pub struct ControlHandle {
    commands: Sender<Command>,
    positions: Receiver<PlaybackPosition>,
    retired: Receiver<Vec<EffectState>>,
    translator: CommandTranslator,
}

impl ControlHandle {
    /// Decode and enqueue one message. Messages about unknown tracks or
    /// effects are dropped without error.
    pub fn send(&mut self, msg: ControlMessage) -> Result<(), EngineError> {
        self.collect_retired();
        let Some(command) = self.translator.translate(msg)? else {
            return Ok(());
        };
        let stock = self.translator.take_stock();
        if !stock.is_empty() {
            self.push(Command::StockEffects(stock))?;
        }
        self.push(command)
    }

    /// Drop the effect states the processor has let go of. Returns how many
    /// there were.
    pub fn collect_retired(&self) -> usize {
        self.retired.try_iter().map(|batch| batch.len()).sum()
    }

    /// Decode a JSON message and enqueue it.
    pub fn post_json(&mut self, json: &str) -> Result<(), EngineError> {
        let msg: ControlMessage = serde_json::from_str(json)?;
        self.send(msg)
    }

    /// Replace the whole wavetable bank.
    pub fn set_wavetables(&self, bank: WavetableBank) -> Result<(), EngineError> {
        self.push(Command::SetWavetables(bank))
    }

    pub fn register_wavetable(
        &self,
        category: &str,
        name: &str,
        data: Vec<f32>,
    ) -> Result<(), EngineError> {
        let category = DrumCategory::from_tag(category).ok_or_else(|| {
            EngineError::InvalidMessage(format!("unknown drum category '{category}'"))
        })?;
        let mut bank = WavetableBank::new();
        bank.insert(category, name, data);
        self.push(Command::AddWavetables(bank))
    }

    /// The most recent position report, if any arrived since the last poll.
    pub fn poll_position(&self) -> Option<PlaybackPosition> {
        self.positions.try_iter().last()
    }

    pub fn has_track(&self, id: &str) -> bool {
        self.translator.has_track(id)
    }

    fn push(&self, command: Command) -> Result<(), EngineError> {
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => {
                warn!(target: "treeseq::processor", "command queue full, dropping command");
                EngineError::QueueFull
            }
            TrySendError::Disconnected(_) => EngineError::Disconnected,
        })
    }
}
