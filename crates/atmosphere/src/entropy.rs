//! Entropy tracker — cross-session instability.
//!
//! The scalar decays exponentially with elapsed real time and rises with
//! each session plus stochastic events. At high levels it corrupts output
//! fragments and injects categorized system artifacts, with frequency and
//! severity scaling continuously with the level. There is no ticker:
//! decay is computed lazily at read time from the stored timestamp.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::Rng;

use counterforce_config::AtmosphereConfig;

use crate::{ContextLayer, LayerInput};

/// Named entropy states, ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntropyLevel {
    Settled,
    Restless,
    Fraying,
    Disordered,
    Chaotic,
}

impl EntropyLevel {
    /// Fixed thresholds: < 0.2 settled, < 0.4 restless, < 0.6 fraying,
    /// < 0.8 disordered, else chaotic.
    pub fn classify(value: f64) -> Self {
        if value < 0.2 {
            EntropyLevel::Settled
        } else if value < 0.4 {
            EntropyLevel::Restless
        } else if value < 0.6 {
            EntropyLevel::Fraying
        } else if value < 0.8 {
            EntropyLevel::Disordered
        } else {
            EntropyLevel::Chaotic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntropyLevel::Settled => "settled",
            EntropyLevel::Restless => "restless",
            EntropyLevel::Fraying => "fraying",
            EntropyLevel::Disordered => "disordered",
            EntropyLevel::Chaotic => "chaotic",
        }
    }
}

/// Decay a stored value across elapsed time: `value * exp(-rate * hours)`.
///
/// A timestamp in the future (clock skew) leaves the value unchanged.
pub fn apply_temporal_decay(
    value: f64,
    stored_at: DateTime<Utc>,
    now: DateTime<Utc>,
    decay_rate: f64,
) -> f64 {
    let elapsed_hours = (now - stored_at).num_seconds() as f64 / 3600.0;
    if elapsed_hours <= 0.0 {
        return value;
    }
    value * (-decay_rate * elapsed_hours).exp()
}

/// Raise entropy for one completed session: base delta plus a randomized
/// event effect, clamped to [0, 1].
pub fn session_increment(value: f64, session_delta: f64, rng: &mut StdRng) -> f64 {
    // Events: usually small noise, occasionally a spike
    let event: f64 = if rng.r#gen::<f64>() < 0.1 {
        rng.gen_range(0.05..0.15)
    } else {
        rng.gen_range(0.0..0.03)
    };
    (value + session_delta + event).clamp(0.0, 1.0)
}

/// Categorized artifacts injected at elevated entropy.
const ARTIFACTS: &[(&str, &[&str])] = &[
    (
        "signal",
        &[
            "(a burst of static swallows a word or two)",
            "(the line hums at a frequency just below speech)",
        ],
    ),
    (
        "memory",
        &[
            "(a recollection surfaces out of order, then withdraws)",
            "(somewhere a filing cabinet opens on its own)",
        ],
    ),
    (
        "system",
        &[
            "(lights flicker; the room resets itself a few seconds back)",
            "(a teletype somewhere prints a line nobody sent)",
        ],
    ),
];

/// Probabilistically corrupt an output fragment at elevated entropy.
///
/// At `Settled`/`Restless` this is the identity. Above that, each word
/// has a chance — scaling with the value — of being struck through into
/// an ellipsis.
pub fn corrupt_fragment(text: &str, value: f64, rng: &mut StdRng) -> String {
    let level = EntropyLevel::classify(value);
    if level < EntropyLevel::Fraying {
        return text.to_string();
    }
    let corruption_chance = (value - 0.4) * 0.25; // 0 at 0.4, 0.15 at 1.0
    text.split_whitespace()
        .map(|word| {
            if rng.r#gen::<f64>() < corruption_chance {
                "…"
            } else {
                word
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The entropy context layer.
pub struct EntropyLayer {
    config: AtmosphereConfig,
}

impl EntropyLayer {
    pub fn new(config: AtmosphereConfig) -> Self {
        Self { config }
    }
}

impl ContextLayer for EntropyLayer {
    fn name(&self) -> &'static str {
        "entropy"
    }

    fn emit(&self, input: &LayerInput<'_>, rng: &mut StdRng) -> Option<String> {
        if !self.config.entropy_enabled {
            return None;
        }
        if input.entropy < self.config.activation_floor {
            return None;
        }
        let level = EntropyLevel::classify(input.entropy);

        let mut snippet = format!(
            "[Instability: {} ({:.2})] The connection is not entirely clean tonight.",
            level.as_str(),
            input.entropy
        );

        // Artifact frequency scales continuously with the value
        if rng.r#gen::<f64>() < input.entropy {
            let (_, pool) = ARTIFACTS[rng.gen_range(0..ARTIFACTS.len())];
            let artifact = pool[rng.gen_range(0..pool.len())];
            snippet.push(' ');
            snippet.push_str(artifact);
        }

        Some(snippet)
    }
}
