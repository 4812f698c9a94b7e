//! Per-sample route mixing.
//!
//! Every voice renders into the accumulator of the route it was triggered
//! on. Each audible route then gets its volume (track volume times volume
//! automation), runs through its effect chain in order, and lands on the
//! master bus at its pan position. Muted or un-soloed routes are skipped
//! entirely, effect chain included.

use crate::arena::Registry;
use crate::dsp::mixer::MasterBus;
use crate::engine::automation::{AutomationEnvelope, AutomationTarget};
use crate::engine::project::{EffectEntry, Route};
use crate::engine::synth_manager::SynthManager;
use crate::engine::track_state::TrackStateManager;

/// Shared, read-only state the mixer consults for one frame.
pub struct MixContext<'a> {
    pub beat: f64,
    pub any_solo: bool,
    pub track_state: &'a TrackStateManager,
    pub effects: &'a Registry<EffectEntry>,
    pub envelopes: &'a Registry<AutomationEnvelope>,
}

#[derive(Debug, Clone)]
pub struct AudioMixer {
    bus: MasterBus,
    route_acc: Vec<f64>,
}

impl AudioMixer {
    pub fn new(master_gain: f64) -> Self {
        AudioMixer {
            bus: MasterBus::new(master_gain),
            route_acc: Vec::new(),
        }
    }

    /// Size the accumulators for `routes` routes. Called when routes change.
    pub fn prepare(&mut self, routes: usize) {
        self.route_acc.clear();
        self.route_acc.resize(routes, 0.0);
    }

    /// Render one stereo frame.
    #[inline]
    pub fn mix_frame(
        &mut self,
        ctx: &MixContext<'_>,
        routes: &mut [Route],
        synths: &mut SynthManager,
    ) -> (f64, f64) {
        if self.route_acc.len() != routes.len() {
            self.prepare(routes.len());
        }
        self.route_acc.fill(0.0);
        synths.render(&mut self.route_acc);

        self.bus.clear();
        for (route, &input) in routes.iter_mut().zip(&self.route_acc) {
            // A silent route's chain is not run: its effect state holds still
            // and any tail resumes where it stopped once the track is audible.
            if !ctx.track_state.is_audible(route.track, ctx.any_solo) {
                continue;
            }
            let Some(mix) = ctx.track_state.get(route.track) else {
                continue;
            };

            let mut volume = mix.volume;
            let mut pan = mix.pan;
            for &handle in &route.automation {
                let Some(env) = ctx.envelopes.get(handle) else {
                    continue;
                };
                if !env.enabled {
                    continue;
                }
                match (env.target, env.value_at(ctx.beat)) {
                    (AutomationTarget::Volume, Some(v)) => volume *= v.max(0.0),
                    (AutomationTarget::Pan, Some(v)) => pan = v.clamp(-1.0, 1.0),
                    _ => {}
                }
            }

            let mut sample = input * volume;
            for slot in &mut route.chain {
                let Some(entry) = ctx.effects.get(slot.effect) else {
                    continue;
                };
                if let (true, Some(settings)) = (entry.enabled, &entry.settings) {
                    sample = slot.state.process(sample, settings);
                }
            }
            self.bus.add(sample, pan);
        }
        self.bus.output()
    }
}
