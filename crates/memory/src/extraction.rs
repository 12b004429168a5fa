//! Candidate extraction — session transcript → scored memory candidates.
//!
//! Only user-authored turns are scanned. Each turn is matched against
//! declarative category rule tables; importance is the weighted sum of
//! matched categories (weights sum to 1.0) plus a bonus for long
//! sessions, capped at 1.0. Candidates below the importance gate are
//! dropped — that is a confidence threshold, not an error.

use regex::Regex;
use std::sync::LazyLock;

use counterforce_config::MemoryConfig;
use counterforce_core::memory::MemoryKind;
use counterforce_core::session::{SessionRecord, SessionRole};

/// Content categories a user turn can match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Personal,
    Depth,
    Significance,
    Preference,
    Fact,
}

/// One row of the category rule table.
struct CategoryRule {
    category: Category,
    weight: f64,
    pattern: &'static LazyLock<Regex>,
}

static PERSONAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(my (name|wife|husband|partner|mother|father|son|daughter|family|job|home|childhood)|i (grew up|was born|live with))\b").unwrap()
});

static DEPTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(why|meaning|believe|feel|afraid|fear|dream|death|love|alone|truth|haunt)\b")
        .unwrap()
});

static SIGNIFICANCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(never told (anyone|you)|first time|confess|secret|important to me|changed my life|can't forget)\b").unwrap()
});

static PREFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(i (prefer|like|love|hate|enjoy|always|never) \w+|my favou?rite)\b").unwrap()
});

static FACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(my name is|i am a|i'm a|i work (at|as|in)|i live in|i was born in)\b")
        .unwrap()
});

/// Category weights sum to 1.0. Order matters for *type* classification:
/// preference and fact are checked before the generic categories — this
/// precedence is intentional and load-bearing, not an accident of
/// iteration order.
static RULES: &[CategoryRule] = &[
    CategoryRule {
        category: Category::Preference,
        weight: 0.20,
        pattern: &PREFERENCE,
    },
    CategoryRule {
        category: Category::Fact,
        weight: 0.15,
        pattern: &FACT,
    },
    CategoryRule {
        category: Category::Personal,
        weight: 0.20,
        pattern: &PERSONAL,
    },
    CategoryRule {
        category: Category::Depth,
        weight: 0.25,
        pattern: &DEPTH,
    },
    CategoryRule {
        category: Category::Significance,
        weight: 0.20,
        pattern: &SIGNIFICANCE,
    },
];

/// A scored extraction candidate, not yet persisted.
#[derive(Debug, Clone)]
pub struct MemoryCandidate {
    pub content: String,
    pub kind: MemoryKind,
    pub importance: f64,
    pub categories: Vec<Category>,
}

/// What extraction produced and what it gated out.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    /// Candidates that passed the importance gate, best first, capped.
    pub candidates: Vec<MemoryCandidate>,
    /// Turns matched a category but fell below the importance gate.
    pub dropped_low_confidence: usize,
}

/// Memory kind from matched categories. First matching rule in table
/// order wins, so preference/fact beat the generic interaction default.
fn classify_kind(categories: &[Category]) -> MemoryKind {
    for category in categories {
        match category {
            Category::Preference | Category::Fact => return MemoryKind::Learning,
            Category::Depth | Category::Significance => return MemoryKind::Insight,
            Category::Personal => {}
        }
    }
    MemoryKind::Interaction
}

/// Scan a finished session for memory candidates.
pub fn extract_candidates(record: &SessionRecord, config: &MemoryConfig) -> ExtractionOutcome {
    let duration_minutes =
        (record.ended_at - record.started_at).num_seconds().max(0) as f64 / 60.0;
    let length_bonus = if duration_minutes > config.length_bonus_minutes {
        config.length_bonus
    } else {
        0.0
    };

    let mut outcome = ExtractionOutcome::default();
    let mut scored: Vec<MemoryCandidate> = Vec::new();

    for message in &record.messages {
        if message.role != SessionRole::User {
            continue;
        }
        let trimmed = message.content.trim();
        if trimmed.is_empty() {
            continue;
        }

        let mut categories = Vec::new();
        let mut importance = 0.0;
        for rule in RULES {
            if rule.pattern.is_match(trimmed) {
                categories.push(rule.category);
                importance += rule.weight;
            }
        }
        if categories.is_empty() {
            continue;
        }

        let importance = (importance + length_bonus).min(1.0);
        if importance < config.min_importance {
            outcome.dropped_low_confidence += 1;
            continue;
        }

        scored.push(MemoryCandidate {
            content: trimmed.to_string(),
            kind: classify_kind(&categories),
            importance,
            categories,
        });
    }

    scored.sort_by(|a, b| {
        b.importance
            .partial_cmp(&a.importance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(config.max_candidates_per_session);
    outcome.candidates = scored;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use counterforce_core::session::SessionMessage;

    fn record(messages: Vec<SessionMessage>, minutes: i64) -> SessionRecord {
        let start = Utc::now();
        SessionRecord {
            session_id: "s1".into(),
            user_id: "u1".into(),
            persona_id: "p1".into(),
            persona_name: "Slothrop".into(),
            messages,
            started_at: start,
            ended_at: start + Duration::minutes(minutes),
        }
    }

    #[test]
    fn persona_turns_are_never_scanned() {
        let outcome = extract_candidates(
            &record(
                vec![SessionMessage::persona(
                    "my name is Slothrop and I believe in the rocket",
                )],
                10,
            ),
            &MemoryConfig::default(),
        );
        assert!(outcome.candidates.is_empty());
    }

    #[test]
    fn preference_classified_as_learning_over_interaction() {
        let outcome = extract_candidates(
            &record(vec![SessionMessage::user("I prefer tea over coffee, why do you ask")], 10),
            &MemoryConfig::default(),
        );
        assert_eq!(outcome.candidates.len(), 1);
        // Matches both preference and depth ("why"); preference wins the kind
        assert_eq!(outcome.candidates[0].kind, MemoryKind::Learning);
    }

    #[test]
    fn depth_alone_classified_as_insight() {
        let config = MemoryConfig {
            min_importance: 0.2,
            ..Default::default()
        };
        let outcome = extract_candidates(
            &record(vec![SessionMessage::user("sometimes the dream comes back")], 10),
            &config,
        );
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].kind, MemoryKind::Insight);
    }

    #[test]
    fn importance_is_weighted_sum_of_categories() {
        let config = MemoryConfig {
            min_importance: 0.1,
            ..Default::default()
        };
        // depth (0.25) + significance (0.20) = 0.45
        let outcome = extract_candidates(
            &record(
                vec![SessionMessage::user("I never told anyone why my father's death still haunts me")],
                10,
            ),
            &config,
        );
        assert_eq!(outcome.candidates.len(), 1);
        let c = &outcome.candidates[0];
        assert!(c.importance > 0.4, "importance {} too low", c.importance);
        assert!(c.categories.contains(&Category::Depth));
        assert!(c.categories.contains(&Category::Significance));
    }

    #[test]
    fn long_session_bonus_applies() {
        let config = MemoryConfig {
            min_importance: 0.1,
            ..Default::default()
        };
        let short = extract_candidates(
            &record(vec![SessionMessage::user("I feel strange tonight")], 5),
            &config,
        );
        let long = extract_candidates(
            &record(vec![SessionMessage::user("I feel strange tonight")], 45),
            &config,
        );
        let bonus = long.candidates[0].importance - short.candidates[0].importance;
        assert!((bonus - config.length_bonus).abs() < 1e-9);
    }

    #[test]
    fn low_confidence_candidates_gated_not_errored() {
        let config = MemoryConfig {
            min_importance: 0.9,
            ..Default::default()
        };
        let outcome = extract_candidates(
            &record(vec![SessionMessage::user("I like trains")], 5),
            &config,
        );
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.dropped_low_confidence, 1);
    }

    #[test]
    fn candidate_cap_keeps_highest_importance() {
        let config = MemoryConfig {
            min_importance: 0.1,
            max_candidates_per_session: 2,
            ..Default::default()
        };
        let outcome = extract_candidates(
            &record(
                vec![
                    SessionMessage::user("I like maps"),
                    SessionMessage::user("I never told anyone why I am afraid of the dark"),
                    SessionMessage::user("my favorite city is Lübeck"),
                    SessionMessage::user("I believe the meaning of the dream is death"),
                ],
                10,
            ),
            &config,
        );
        assert_eq!(outcome.candidates.len(), 2);
        assert!(outcome.candidates[0].importance >= outcome.candidates[1].importance);
    }

    #[test]
    fn unmatched_smalltalk_produces_nothing() {
        let outcome = extract_candidates(
            &record(vec![SessionMessage::user("ok"), SessionMessage::user("sure, go on")], 5),
            &MemoryConfig::default(),
        );
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.dropped_low_confidence, 0);
    }
}
