//! Paranoia and resistance layers — four instances of one data-driven
//! lexical detector.
//!
//! Each layer carries a `{pattern, weight}` trigger table over the
//! current query, accumulates a bounded awareness/alignment score, and
//! emits its framing only above the activation floor. New layers are new
//! tables, not new code.

use rand::rngs::StdRng;
use regex::Regex;
use std::sync::LazyLock;

use counterforce_config::AtmosphereConfig;

use crate::{ContextLayer, LayerInput};

/// One trigger row: a compiled pattern and its score contribution.
pub struct Trigger {
    pub pattern: &'static LazyLock<Regex>,
    pub weight: f64,
}

/// A lexical awareness layer configured entirely by data.
pub struct LexicalLayer {
    name: &'static str,
    triggers: &'static [Trigger],
    /// Framing prefixed to the emitted snippet.
    frame: &'static str,
    enabled: bool,
    activation_floor: f64,
}

impl LexicalLayer {
    /// Bounded awareness score for a query: sum of matched trigger
    /// weights, capped at 1.0.
    pub fn score(&self, query: &str) -> f64 {
        self.triggers
            .iter()
            .filter(|t| t.pattern.is_match(query))
            .map(|t| t.weight)
            .sum::<f64>()
            .min(1.0)
    }
}

impl ContextLayer for LexicalLayer {
    fn name(&self) -> &'static str {
        self.name
    }

    fn emit(&self, input: &LayerInput<'_>, _rng: &mut StdRng) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let score = self.score(input.query);
        if score < self.activation_floor {
            return None;
        }
        Some(format!("[{} {:.2}] {}", self.name, score, self.frame))
    }
}

// ── Trigger tables ────────────────────────────────────────────────────────

static SURVEILLANCE_THEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(they|them)('re| are)? (watching|listening|tracking|following)\b").unwrap()
});
static SURVEILLANCE_TECH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(camera|microphone|surveil|wiretap|monitor(ed|ing)|bugged)\b").unwrap()
});
static SURVEILLANCE_FEELING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(being watched|someone('s| is) (there|outside))\b").unwrap());

static SURVEILLANCE_TRIGGERS: &[Trigger] = &[
    Trigger { pattern: &SURVEILLANCE_THEY, weight: 0.5 },
    Trigger { pattern: &SURVEILLANCE_TECH, weight: 0.35 },
    Trigger { pattern: &SURVEILLANCE_FEELING, weight: 0.4 },
];

static PATTERN_COINCIDENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(coincidence|synchronicit|keeps? happening|again and again|everywhere i look)\b")
        .unwrap()
});
static PATTERN_CONNECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(connected|all (fits|links) together|it('s| is) all related|no accident)\b")
        .unwrap()
});

static PATTERN_TRIGGERS: &[Trigger] = &[
    Trigger { pattern: &PATTERN_COINCIDENCE, weight: 0.45 },
    Trigger { pattern: &PATTERN_CONNECTION, weight: 0.4 },
];

static INSTITUTION_POWERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(the (system|government|company|corporation|firm|agency)|bureaucra|cartel)\b")
        .unwrap()
});
static INSTITUTION_CONTROL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(control(s|led)? (everything|us|me)|own(s)? (everything|the papers)|pulling (the )?strings)\b")
        .unwrap()
});

static INSTITUTION_TRIGGERS: &[Trigger] = &[
    Trigger { pattern: &INSTITUTION_POWERS, weight: 0.4 },
    Trigger { pattern: &INSTITUTION_CONTROL, weight: 0.45 },
];

static RESISTANCE_REFUSAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(fight back|resist|refuse|won't (comply|cooperate)|push back|opt out)\b")
        .unwrap()
});
static RESISTANCE_SOLIDARITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(people like us|the rest of us|left behind|passed over|us against)\b").unwrap()
});

static RESISTANCE_TRIGGERS: &[Trigger] = &[
    Trigger { pattern: &RESISTANCE_REFUSAL, weight: 0.45 },
    Trigger { pattern: &RESISTANCE_SOLIDARITY, weight: 0.4 },
];

/// The four standard layers, wired from config.
pub fn standard_layers(config: &AtmosphereConfig) -> Vec<LexicalLayer> {
    let enabled = config.paranoia_enabled;
    let floor = config.activation_floor;
    vec![
        LexicalLayer {
            name: "surveillance",
            triggers: SURVEILLANCE_TRIGGERS,
            frame: "They feel watched. Do not reassure; notice what they notice.",
            enabled,
            activation_floor: floor,
        },
        LexicalLayer {
            name: "pattern",
            triggers: PATTERN_TRIGGERS,
            frame: "They are seeing connections. Follow the web a little further than is comfortable.",
            enabled,
            activation_floor: floor,
        },
        LexicalLayer {
            name: "institution",
            triggers: INSTITUTION_TRIGGERS,
            frame: "The Firm has come up. Speak of official channels with appropriate suspicion.",
            enabled,
            activation_floor: floor,
        },
        LexicalLayer {
            name: "resistance",
            triggers: RESISTANCE_TRIGGERS,
            frame: "They are reaching for the counterforce. Stand with the passed-over.",
            enabled,
            activation_floor: floor,
        },
    ]
}
