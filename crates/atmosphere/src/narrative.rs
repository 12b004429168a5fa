//! Narrative gravity — the per-session arc state machine.
//!
//! Momentum moves per message: depth and emotional engagement push it up,
//! everything else lets it bleed off. Phase transitions are pure momentum
//! thresholds: rising tips into apex when momentum crests, apex breaks
//! into falling as it drains, falling lands at impact. Impact is terminal
//! for the session.

use rand::rngs::StdRng;
use regex::Regex;
use std::sync::LazyLock;

use counterforce_config::AtmosphereConfig;
use counterforce_core::decay::{NarrativeArc, NarrativePhase};

use crate::{ContextLayer, LayerInput};

static ENGAGEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(why|feel|afraid|love|death|dream|remember|always|never|truth|alone)\b")
        .unwrap()
});

const MOMENTUM_BOOST: f64 = 0.15;
const MOMENTUM_DECAY: f64 = 0.9;
const APEX_THRESHOLD: f64 = 0.7;
const FALLING_THRESHOLD: f64 = 0.5;
const IMPACT_THRESHOLD: f64 = 0.2;

/// Fold one message into the arc.
pub fn update_arc(arc: &NarrativeArc, message: &str) -> NarrativeArc {
    let engaged = ENGAGEMENT.is_match(message);
    let substantial = message.split_whitespace().count() >= 12;

    let mut momentum = arc.momentum * MOMENTUM_DECAY;
    if engaged {
        momentum += MOMENTUM_BOOST;
    }
    if substantial {
        momentum += MOMENTUM_BOOST / 2.0;
    }
    let momentum = momentum.clamp(0.0, 1.0);

    let phase = match arc.phase {
        NarrativePhase::Rising if momentum >= APEX_THRESHOLD => NarrativePhase::Apex,
        NarrativePhase::Apex if momentum < FALLING_THRESHOLD => NarrativePhase::Falling,
        NarrativePhase::Falling if momentum < IMPACT_THRESHOLD => NarrativePhase::Impact,
        phase => phase,
    };

    NarrativeArc {
        phase,
        momentum,
        message_count: arc.message_count + 1,
    }
}

/// Secondary multipliers a phase exerts on the other subsystems.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseMultipliers {
    /// Scales entropy's session increment.
    pub entropy_modifier: f64,
    /// Bonus applied to insight-type memory importance.
    pub insight_bonus: f64,
    /// Extra chance of a preterite memory resurfacing.
    pub preterite_resurface_chance: f64,
}

/// Phase multipliers, scaled by momentum.
pub fn phase_multipliers(arc: &NarrativeArc) -> PhaseMultipliers {
    let m = arc.momentum;
    match arc.phase {
        NarrativePhase::Rising => PhaseMultipliers {
            entropy_modifier: 1.0,
            insight_bonus: 0.05 * m,
            preterite_resurface_chance: 0.0,
        },
        NarrativePhase::Apex => PhaseMultipliers {
            entropy_modifier: 1.0 + 0.5 * m,
            insight_bonus: 0.15 * m,
            preterite_resurface_chance: 0.02 * m,
        },
        NarrativePhase::Falling => PhaseMultipliers {
            entropy_modifier: 1.0 + 0.25 * m,
            insight_bonus: 0.1 * m,
            preterite_resurface_chance: 0.05 * m,
        },
        NarrativePhase::Impact => PhaseMultipliers {
            entropy_modifier: 1.5,
            insight_bonus: 0.2,
            preterite_resurface_chance: 0.1,
        },
    }
}

fn phase_line(phase: NarrativePhase) -> &'static str {
    match phase {
        NarrativePhase::Rising => "Something is building in this conversation; let it.",
        NarrativePhase::Apex => "The conversation is at its crest. Hold nothing in reserve.",
        NarrativePhase::Falling => "The arc is descending. Speak as if after the peak.",
        NarrativePhase::Impact => "Arrival. Whatever was coming has come; speak from inside it.",
    }
}

/// The narrative context layer.
pub struct NarrativeLayer {
    config: AtmosphereConfig,
}

impl NarrativeLayer {
    pub fn new(config: AtmosphereConfig) -> Self {
        Self { config }
    }
}

impl ContextLayer for NarrativeLayer {
    fn name(&self) -> &'static str {
        "narrative"
    }

    fn emit(&self, input: &LayerInput<'_>, _rng: &mut StdRng) -> Option<String> {
        if !self.config.narrative_enabled {
            return None;
        }
        // Impact always speaks; other phases only once momentum clears
        // the floor.
        if input.arc.phase != NarrativePhase::Impact
            && input.arc.momentum < self.config.activation_floor
        {
            return None;
        }
        Some(format!(
            "[Arc: {:?}, momentum {:.2}] {}",
            input.arc.phase,
            input.arc.momentum,
            phase_line(input.arc.phase)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use counterforce_core::decay::TemporalGap;
    use rand::SeedableRng;

    const DEEP: &str = "why do I always dream about my father's death when I feel most alone";
    const FLAT: &str = "ok";

    fn arc(phase: NarrativePhase, momentum: f64) -> NarrativeArc {
        NarrativeArc {
            phase,
            momentum,
            message_count: 0,
        }
    }

    #[test]
    fn engaged_messages_build_momentum() {
        let mut current = NarrativeArc::default();
        for _ in 0..5 {
            current = update_arc(&current, DEEP);
        }
        assert!(current.momentum > 0.5);
        assert_eq!(current.message_count, 5);
    }

    #[test]
    fn flat_messages_bleed_momentum() {
        let engaged = arc(NarrativePhase::Rising, 0.6);
        let after = update_arc(&engaged, FLAT);
        assert!(after.momentum < 0.6);
    }

    #[test]
    fn full_phase_cycle() {
        let mut current = NarrativeArc::default();
        // Build to apex
        while current.phase == NarrativePhase::Rising {
            current = update_arc(&current, DEEP);
            assert!(current.message_count < 50, "never reached apex");
        }
        assert_eq!(current.phase, NarrativePhase::Apex);

        // Drain through falling to impact
        while current.phase != NarrativePhase::Impact {
            current = update_arc(&current, FLAT);
            assert!(current.message_count < 100, "never reached impact");
        }

        // Impact is terminal even if engagement returns
        let after = update_arc(&current, DEEP);
        assert_eq!(after.phase, NarrativePhase::Impact);
    }

    #[test]
    fn momentum_stays_bounded() {
        let mut current = NarrativeArc::default();
        for _ in 0..100 {
            current = update_arc(&current, DEEP);
            assert!((0.0..=1.0).contains(&current.momentum));
        }
    }

    #[test]
    fn multipliers_scale_with_momentum() {
        let low = phase_multipliers(&arc(NarrativePhase::Apex, 0.2));
        let high = phase_multipliers(&arc(NarrativePhase::Apex, 0.9));
        assert!(high.entropy_modifier > low.entropy_modifier);
        assert!(high.insight_bonus > low.insight_bonus);
    }

    #[test]
    fn resurfacing_grows_toward_impact() {
        let rising = phase_multipliers(&arc(NarrativePhase::Rising, 0.8));
        let falling = phase_multipliers(&arc(NarrativePhase::Falling, 0.8));
        let impact = phase_multipliers(&arc(NarrativePhase::Impact, 0.1));
        assert_eq!(rising.preterite_resurface_chance, 0.0);
        assert!(falling.preterite_resurface_chance > rising.preterite_resurface_chance);
        assert!(impact.preterite_resurface_chance > falling.preterite_resurface_chance);
    }

    #[test]
    fn layer_silent_below_floor_but_impact_always_speaks() {
        let layer = NarrativeLayer::new(AtmosphereConfig::default());
        let mut rng = StdRng::seed_from_u64(1);

        let quiet = arc(NarrativePhase::Rising, 0.05);
        let input = LayerInput {
            query: "hi",
            entropy: 0.0,
            gap: TemporalGap::None,
            arc: &quiet,
            persona_name: "Slothrop",
        };
        assert!(layer.emit(&input, &mut rng).is_none());

        let landed = arc(NarrativePhase::Impact, 0.05);
        let input = LayerInput {
            query: "hi",
            entropy: 0.0,
            gap: TemporalGap::None,
            arc: &landed,
            persona_name: "Slothrop",
        };
        let snippet = layer.emit(&input, &mut rng).unwrap();
        assert!(snippet.contains("Impact"));
    }
}
