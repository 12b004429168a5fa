//! Persistent store for the Counterforce engine.
//!
//! The engine consumes persistence strictly through the [`PersonaStore`]
//! trait: typed query/insert/upsert operations plus a vector-similarity
//! search primitive. Two backends:
//!
//! - [`SqliteStore`] — production: WAL journal, FTS5 keyword search,
//!   embeddings as little-endian f32 blobs
//! - [`MemoryStore`] — tests and ephemeral sessions
//!
//! The store client is constructed once at the composition root and
//! injected; nothing in the request hot path opens connections.

pub mod embedding;
pub mod memory_store;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod vector;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use counterforce_core::error::StoreError;
use counterforce_core::memory::{ElectionStatus, MemoryRecord};
use counterforce_core::persona::{Persona, SoulValidation};
use counterforce_core::relationship::Relationship;
use counterforce_core::setting::UserSetting;
use counterforce_core::EntropyState;

pub use embedding::{EmbeddingService, FailingEmbedder, HashEmbedder};
pub use memory_store::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// The persistent store boundary.
///
/// Keyword and similarity searches exclude preterite rows; the forgetting
/// pipeline reaches those explicitly through `list_preterite_memories`.
#[async_trait]
pub trait PersonaStore: Send + Sync {
    /// The backend name (e.g. "sqlite", "in_memory").
    fn name(&self) -> &str;

    // --- Personas / souls ---

    async fn get_persona(&self, id: &str) -> Result<Option<Persona>, StoreError>;

    async fn get_persona_by_slug(&self, slug: &str) -> Result<Option<Persona>, StoreError>;

    /// Authoring-side write; the engine itself only uses this in seeding
    /// and tests.
    async fn upsert_persona(&self, persona: &Persona) -> Result<(), StoreError>;

    async fn record_soul_validation(&self, validation: &SoulValidation) -> Result<(), StoreError>;

    // --- Relationships ---

    async fn get_relationship(
        &self,
        persona_id: &str,
        user_id: &str,
    ) -> Result<Option<Relationship>, StoreError>;

    async fn upsert_relationship(&self, relationship: &Relationship) -> Result<(), StoreError>;

    // --- Memories ---

    /// Insert a memory; assigns an id when `memory.id` is empty. Returns
    /// the id.
    async fn insert_memory(&self, memory: &MemoryRecord) -> Result<String, StoreError>;

    /// Non-preterite memories for the pair, newest first.
    async fn list_memories(
        &self,
        persona_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError>;

    /// Non-preterite memories matching any of the tokens, best match first.
    async fn keyword_search_memories(
        &self,
        persona_id: &str,
        user_id: &str,
        tokens: &[String],
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError>;

    /// Non-preterite memories ranked by cosine similarity to the query
    /// embedding; `score` carries the similarity.
    async fn similarity_search_memories(
        &self,
        persona_id: &str,
        user_id: &str,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError>;

    /// Preterite memories for the pair, newest first. Used only by the
    /// resurfacing roll.
    async fn list_preterite_memories(
        &self,
        persona_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError>;

    /// Rewrite a memory's election status and content (consignment writes
    /// the degraded form; the original content is not retained).
    async fn update_memory_election(
        &self,
        id: &str,
        election: ElectionStatus,
        content: &str,
    ) -> Result<(), StoreError>;

    // --- Entropy ---

    async fn get_entropy(
        &self,
        persona_id: &str,
        user_id: &str,
    ) -> Result<Option<EntropyState>, StoreError>;

    async fn upsert_entropy(&self, state: &EntropyState) -> Result<(), StoreError>;

    // --- Temporal ---

    async fn get_last_active(&self, persona_id: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn set_last_active(
        &self,
        persona_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // --- Session completion markers ---

    async fn session_completed(&self, session_id: &str) -> Result<bool, StoreError>;

    async fn mark_session_completed(
        &self,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // --- User settings ---

    async fn get_user_setting(
        &self,
        persona_id: &str,
        user_id: &str,
    ) -> Result<Option<UserSetting>, StoreError>;

    async fn upsert_user_setting(&self, setting: &UserSetting) -> Result<(), StoreError>;
}
