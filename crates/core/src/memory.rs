//! Memory records — per (persona, user) retained conversation knowledge.
//!
//! Memories carry an election status in the Calvinist sense the persona
//! corpus uses: *elect* memories are fully retrievable, *preterite*
//! memories are lossily degraded and only rarely resurface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of knowledge a memory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Something that happened in conversation (the generic default).
    Interaction,
    /// Something the user taught or stated as fact.
    Learning,
    /// A deeper observation about the user.
    Insight,
}

/// Retention class assigned at session completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionStatus {
    /// Fully retrievable.
    Elect,
    /// Retrievable, eligible for later demotion.
    Borderline,
    /// Lossily degraded; resurfaces only by a small decaying chance.
    Preterite,
}

/// A single stored memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub persona_id: String,
    pub user_id: String,

    /// The memory text. For preterite memories this is the degraded form;
    /// the original is not recoverable.
    pub content: String,

    pub kind: MemoryKind,

    /// Importance in [0, 1], set at extraction time.
    pub importance: f64,

    /// Optional embedding vector (stored as a blob in the store).
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,

    pub created_at: DateTime<Utc>,

    pub election: ElectionStatus,

    /// Relevance score set by retrieval operations; not persisted.
    #[serde(default, skip_serializing)]
    pub score: f64,
}

impl MemoryRecord {
    /// Construct a new elect memory with no embedding.
    pub fn new(
        persona_id: &str,
        user_id: &str,
        content: &str,
        kind: MemoryKind,
        importance: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: String::new(),
            persona_id: persona_id.into(),
            user_id: user_id.into(),
            content: content.into(),
            kind,
            importance: importance.clamp(0.0, 1.0),
            embedding: None,
            created_at: now,
            election: ElectionStatus::Elect,
            score: 0.0,
        }
    }

    pub fn is_retrievable(&self) -> bool {
        !matches!(self.election, ElectionStatus::Preterite)
    }
}
