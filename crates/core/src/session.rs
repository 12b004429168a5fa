//! Session types — the transcript handed to session completion and the
//! aggregate outcome it returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::relationship::Relationship;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    User,
    Persona,
}

/// One turn of a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: SessionRole,
    pub content: String,
}

impl SessionMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: SessionRole::User,
            content: content.into(),
        }
    }

    pub fn persona(content: impl Into<String>) -> Self {
        Self {
            role: SessionRole::Persona,
            content: content.into(),
        }
    }
}

/// A completed session, as handed to `complete_session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub persona_id: String,
    pub persona_name: String,
    pub messages: Vec<SessionMessage>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Observable engagement signals measured from a transcript.
///
/// Shared between session completion (which measures it) and the
/// relationship tracker (which turns it into an engagement score).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionQuality {
    /// User-authored turns in the session.
    pub message_count: usize,

    /// Wall-clock session length.
    pub duration_minutes: f64,

    /// Whether any user turn asked a follow-up question.
    pub has_follow_up: bool,

    /// Fraction of user turns touching the depth lexicon, in [0, 1].
    pub topic_depth: f64,
}

/// Words whose presence marks a user turn as topically deep.
const DEPTH_LEXICON: &[&str] = &[
    "why", "meaning", "believe", "feel", "afraid", "remember", "death", "love", "dream", "alone",
    "truth",
];

impl SessionQuality {
    /// Measure engagement signals from a finished transcript.
    pub fn measure(record: &SessionRecord) -> Self {
        let user_turns: Vec<&SessionMessage> = record
            .messages
            .iter()
            .filter(|m| m.role == SessionRole::User)
            .collect();

        let duration_minutes = (record.ended_at - record.started_at)
            .num_seconds()
            .max(0) as f64
            / 60.0;

        let has_follow_up = user_turns.iter().any(|m| m.content.contains('?'));

        let deep_turns = user_turns
            .iter()
            .filter(|m| {
                let lower = m.content.to_lowercase();
                DEPTH_LEXICON.iter().any(|w| lower.contains(w))
            })
            .count();
        let topic_depth = if user_turns.is_empty() {
            0.0
        } else {
            deep_turns as f64 / user_turns.len() as f64
        };

        Self {
            message_count: user_turns.len(),
            duration_minutes,
            has_follow_up,
            topic_depth,
        }
    }
}

/// Aggregate result of `complete_session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    /// Relationship state after the update (fallback stranger if the
    /// store was unavailable).
    pub relationship: Relationship,

    /// Elect/borderline memories persisted.
    pub memories_stored: usize,

    /// Candidates consigned to the degraded preterite form.
    pub memories_consigned_to_preterite: usize,

    /// Engagement signals measured from the transcript.
    pub session_quality: SessionQuality,

    /// Whether user-setting hints were extracted this session.
    pub settings_extracted: bool,

    /// True when the session had already been completed and nothing was
    /// mutated.
    pub skipped: bool,

    /// Set on unexpected internal failure; partial mutations stand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
