//! DSP building blocks: envelopes, filters, oscillators, voices and effects.
//!
//! Everything here is sample-at-a-time, allocation-free once constructed, and
//! deterministic: noise sources are seeded, so the same input always renders
//! the same output.

pub mod effects;
pub mod envelope;
pub mod filter;
pub mod mixer;
pub mod oscillator;
pub mod synth;
pub mod wavetable;
