//! Temporal awareness — reflecting on the gap since last contact.
//!
//! The last-active timestamp itself is never decayed; only the elapsed
//! gap is classified, into the six fixed bands of
//! [`TemporalGap::from_elapsed_ms`].

use rand::rngs::StdRng;

use counterforce_config::AtmosphereConfig;
use counterforce_core::decay::TemporalGap;

use crate::{ContextLayer, LayerInput};

fn reflection(gap: TemporalGap, persona_name: &str) -> Option<String> {
    let line = match gap {
        TemporalGap::None => return None,
        TemporalGap::Brief => "They stepped out only hours ago; pick the thread back up mid-motion.",
        TemporalGap::Notable => {
            "Most of a day has passed. Acknowledge it the way you would, sideways."
        }
        TemporalGap::Significant => {
            "Days have gone by. Something has shifted in the room since they left."
        }
        TemporalGap::Major => "The better part of a week. Let the absence be felt before anything else.",
        TemporalGap::Extended => {
            "A long silence, long enough to wonder if they were coming back at all."
        }
    };
    Some(format!(
        "[Gap: {}] {persona_name} registers the time passed. {line}",
        gap.as_str()
    ))
}

/// The temporal context layer.
pub struct TemporalLayer {
    config: AtmosphereConfig,
}

impl TemporalLayer {
    pub fn new(config: AtmosphereConfig) -> Self {
        Self { config }
    }
}

impl ContextLayer for TemporalLayer {
    fn name(&self) -> &'static str {
        "temporal"
    }

    fn emit(&self, input: &LayerInput<'_>, _rng: &mut StdRng) -> Option<String> {
        if !self.config.temporal_enabled {
            return None;
        }
        reflection(input.gap, input.persona_name)
    }
}
