//! Decay-model state types: entropy, narrative arc, temporal gap.
//!
//! There is no background ticking process anywhere in the engine. All
//! cross-session decay is computed lazily from elapsed wall-clock time at
//! read time, against the timestamps stored here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cross-session instability scalar for one (persona, user) pair.
///
/// Decays exponentially with elapsed real time; increases with each
/// completed session and with stochastic events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntropyState {
    pub persona_id: String,
    pub user_id: String,

    /// Instability in [0, 1] as of `updated_at`.
    pub value: f64,

    /// When `value` was last written; decay is computed from here.
    pub updated_at: DateTime<Utc>,
}

impl EntropyState {
    pub fn new(persona_id: &str, user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            persona_id: persona_id.into(),
            user_id: user_id.into(),
            value: 0.0,
            updated_at: now,
        }
    }
}

/// Phase of the per-session narrative arc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativePhase {
    Rising,
    Apex,
    Falling,
    Impact,
}

/// Per-session narrative state machine: phase + momentum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeArc {
    pub phase: NarrativePhase,

    /// Momentum in [0, 1], updated per message.
    pub momentum: f64,

    /// Messages folded into this arc so far.
    pub message_count: usize,
}

impl Default for NarrativeArc {
    fn default() -> Self {
        Self {
            phase: NarrativePhase::Rising,
            momentum: 0.0,
            message_count: 0,
        }
    }
}

/// Elapsed-gap band since last contact. Six ascending bands from fixed
/// millisecond thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalGap {
    None,
    Brief,
    Notable,
    Significant,
    Major,
    Extended,
}

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

impl TemporalGap {
    /// Classify an elapsed gap in milliseconds.
    ///
    /// Bands: < 1h none, < 6h brief, < 1d notable, < 3d significant,
    /// < 1w major, otherwise extended. Negative gaps (clock skew) are
    /// treated as no gap.
    pub fn from_elapsed_ms(elapsed_ms: i64) -> Self {
        if elapsed_ms < HOUR_MS {
            TemporalGap::None
        } else if elapsed_ms < 6 * HOUR_MS {
            TemporalGap::Brief
        } else if elapsed_ms < DAY_MS {
            TemporalGap::Notable
        } else if elapsed_ms < 3 * DAY_MS {
            TemporalGap::Significant
        } else if elapsed_ms < 7 * DAY_MS {
            TemporalGap::Major
        } else {
            TemporalGap::Extended
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TemporalGap::None => "none",
            TemporalGap::Brief => "brief",
            TemporalGap::Notable => "notable",
            TemporalGap::Significant => "significant",
            TemporalGap::Major => "major",
            TemporalGap::Extended => "extended",
        }
    }
}
