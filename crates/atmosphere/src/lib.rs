//! Atmosphere — the decaying thematic layers around a persona's context.
//!
//! Five layers share one contract: detect trigger patterns, accumulate or
//! classify a bounded score, and emit a framed text snippet only above a
//! minimum activation threshold. Layers are additive, independently
//! toggleable, and never required for assembly to succeed.
//!
//! - [`entropy`] — cross-session instability with lazy exponential decay
//! - [`narrative`] — per-session phase machine with momentum
//! - [`temporal`] — elapsed-gap reflection since last contact
//! - [`paranoia`] — four lexical trigger layers over the current query

pub mod entropy;
pub mod narrative;
pub mod paranoia;
pub mod temporal;

use counterforce_core::decay::{NarrativeArc, TemporalGap};
use rand::rngs::StdRng;

pub use entropy::{apply_temporal_decay, session_increment, EntropyLayer, EntropyLevel};
pub use narrative::{phase_multipliers, update_arc, NarrativeLayer, PhaseMultipliers};
pub use paranoia::{standard_layers, LexicalLayer};
pub use temporal::TemporalLayer;

/// Everything a layer may look at when deciding whether to speak.
///
/// The orchestrator fetches the decayed state once and hands the same
/// input to every layer; layers themselves do no I/O.
pub struct LayerInput<'a> {
    /// The user's current query.
    pub query: &'a str,

    /// Decayed entropy value as of now.
    pub entropy: f64,

    /// Gap band since the persona was last active.
    pub gap: TemporalGap,

    /// The session's narrative arc.
    pub arc: &'a NarrativeArc,

    /// Display name, for persona-flavored reflections.
    pub persona_name: &'a str,
}

/// The shared layer contract.
pub trait ContextLayer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Emit a framed snippet, or `None` below the activation threshold.
    fn emit(&self, input: &LayerInput<'_>, rng: &mut StdRng) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use counterforce_core::decay::NarrativePhase;
    use rand::SeedableRng;

    struct AlwaysLayer;

    impl ContextLayer for AlwaysLayer {
        fn name(&self) -> &'static str {
            "always"
        }

        fn emit(&self, input: &LayerInput<'_>, _rng: &mut StdRng) -> Option<String> {
            Some(format!("[always] {}", input.query))
        }
    }

    #[test]
    fn layers_are_object_safe_and_composable() {
        let layers: Vec<Box<dyn ContextLayer>> = vec![Box::new(AlwaysLayer)];
        let arc = NarrativeArc {
            phase: NarrativePhase::Rising,
            momentum: 0.5,
            message_count: 3,
        };
        let input = LayerInput {
            query: "hello",
            entropy: 0.2,
            gap: TemporalGap::None,
            arc: &arc,
            persona_name: "Slothrop",
        };
        let mut rng = StdRng::seed_from_u64(1);
        let emitted: Vec<String> = layers
            .iter()
            .filter_map(|layer| layer.emit(&input, &mut rng))
            .collect();
        assert_eq!(emitted, vec!["[always] hello"]);
    }
}
