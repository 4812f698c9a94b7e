//! Read-only bank of recorded drum waveforms.
//!
//! The bank is filled from the control plane with full-length, normalized
//! waveforms that already match the engine's sample rate. Voices hold
//! `Arc` clones of the sample they play, so replacing the bank never frees
//! memory on the audio thread while a note is still reading it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Category a sample belongs to. Each sampled instrument reads one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrumCategory {
    Kick,
    Snare,
    Hihat,
    Clap,
    Tom,
    Perc,
}

impl DrumCategory {
    pub const ALL: [DrumCategory; 6] = [
        DrumCategory::Kick,
        DrumCategory::Snare,
        DrumCategory::Hihat,
        DrumCategory::Clap,
        DrumCategory::Tom,
        DrumCategory::Perc,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "kick" => Some(DrumCategory::Kick),
            "snare" => Some(DrumCategory::Snare),
            "hihat" | "hi-hat" => Some(DrumCategory::Hihat),
            "clap" => Some(DrumCategory::Clap),
            "tom" => Some(DrumCategory::Tom),
            "perc" | "percussion" => Some(DrumCategory::Perc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DrumCategory::Kick => "kick",
            DrumCategory::Snare => "snare",
            DrumCategory::Hihat => "hihat",
            DrumCategory::Clap => "clap",
            DrumCategory::Tom => "tom",
            DrumCategory::Perc => "perc",
        }
    }
}

/// Shared sample data.
pub type SampleData = Arc<[f32]>;

/// Drum category → sample name → waveform, ordered by name.
#[derive(Debug, Clone, Default)]
pub struct WavetableBank {
    categories: BTreeMap<DrumCategory, BTreeMap<String, SampleData>>,
}

impl WavetableBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one sample. Empty waveforms are ignored.
    pub fn insert(&mut self, category: DrumCategory, name: &str, data: impl Into<SampleData>) {
        let data = data.into();
        if data.is_empty() {
            log::warn!(target: "treeseq::synth", "ignoring empty wavetable {}/{name}", category.as_str());
            return;
        }
        self.categories
            .entry(category)
            .or_default()
            .insert(name.to_string(), data);
    }

    /// Pick the named sample, falling back to the first by name.
    pub fn select(&self, category: DrumCategory, name: Option<&str>) -> Option<SampleData> {
        let samples = self.categories.get(&category)?;
        name.and_then(|n| samples.get(n))
            .or_else(|| samples.values().next())
            .cloned()
    }

    pub fn names(&self, category: DrumCategory) -> impl Iterator<Item = &str> {
        self.categories
            .get(&category)
            .into_iter()
            .flat_map(|m| m.keys().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge every sample from `other`, replacing same-named entries.
    pub fn extend(&mut self, other: WavetableBank) {
        for (category, samples) in other.categories {
            self.categories.entry(category).or_default().extend(samples);
        }
    }
}
