//! Relationship state — per (persona, user) trust and familiarity.
//!
//! The trust level is *never* stored independently: it is always
//! recomputable from the familiarity score through fixed thresholds
//! (0.2 / 0.5 / 0.8). Familiarity only moves through session completion
//! and is monotone non-decreasing, clamped to [0, 1].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Categorical relationship stage, derived purely from familiarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Stranger,
    Acquaintance,
    Familiar,
    Confidant,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Stranger => "stranger",
            TrustLevel::Acquaintance => "acquaintance",
            TrustLevel::Familiar => "familiar",
            TrustLevel::Confidant => "confidant",
        }
    }
}

/// Cross-session relationship state for one (persona, user) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub persona_id: String,
    pub user_id: String,

    /// Familiarity score in [0, 1]; monotone non-decreasing.
    pub familiarity: f64,

    /// Derived trust level; must always equal
    /// `calculate_trust_level(familiarity)`.
    pub trust_level: TrustLevel,

    /// Completed sessions counted into this relationship.
    pub interaction_count: u64,

    /// Free-text summary of the relationship so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Free-text user preferences the persona should respect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set when this value is an in-memory default produced because the
    /// store was unavailable. Fallback relationships are never persisted.
    #[serde(default, skip_serializing)]
    pub fallback: bool,
}

impl Relationship {
    /// A brand-new stranger relationship for first contact.
    pub fn stranger(persona_id: &str, user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            persona_id: persona_id.into(),
            user_id: user_id.into(),
            familiarity: 0.0,
            trust_level: TrustLevel::Stranger,
            interaction_count: 0,
            summary: None,
            preferences: None,
            created_at: now,
            updated_at: now,
            fallback: false,
        }
    }

    /// Same as [`Relationship::stranger`] but flagged as a storage-failure
    /// fallback so callers can tell it was never persisted.
    pub fn fallback_stranger(persona_id: &str, user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            fallback: true,
            ..Self::stranger(persona_id, user_id, now)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_level_is_ordered() {
        assert!(TrustLevel::Stranger < TrustLevel::Acquaintance);
        assert!(TrustLevel::Acquaintance < TrustLevel::Familiar);
        assert!(TrustLevel::Familiar < TrustLevel::Confidant);
    }

    #[test]
    fn stranger_starts_at_zero() {
        let rel = Relationship::stranger("p1", "u1", Utc::now());
        assert_eq!(rel.familiarity, 0.0);
        assert_eq!(rel.trust_level, TrustLevel::Stranger);
        assert_eq!(rel.interaction_count, 0);
        assert!(!rel.fallback);
    }

    #[test]
    fn fallback_stranger_is_flagged() {
        let rel = Relationship::fallback_stranger("p1", "u1", Utc::now());
        assert!(rel.fallback);
        assert_eq!(rel.trust_level, TrustLevel::Stranger);
    }

    #[test]
    fn fallback_flag_not_serialized() {
        let rel = Relationship::fallback_stranger("p1", "u1", Utc::now());
        let json = serde_json::to_string(&rel).unwrap();
        assert!(!json.contains("fallback"));
    }
}
