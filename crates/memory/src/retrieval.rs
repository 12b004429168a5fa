//! Hybrid retrieval with graceful fallback.
//!
//! One public entry point, three internal paths:
//!
//! 1. **Semantic** — embed the query, similarity-search the store, blend
//!    similarity with recency and importance, filter by the similarity
//!    floor.
//! 2. **Keyword** — when embedding fails, is unavailable, or the
//!    semantic pass finds nothing, FTS over query tokens of three or
//!    more characters.
//! 3. **Importance** — when no usable tokens exist, importance + recency
//!    ordering.
//!
//! Every failure is caught, reported to the diagnostic sink, and falls
//! through to the next path. Total failure returns an empty vec; this
//! function never errors outward.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use counterforce_config::MemoryConfig;
use counterforce_core::clock::Clock;
use counterforce_core::memory::MemoryRecord;
use counterforce_store::vector::hybrid_score;
use counterforce_store::{EmbeddingService, PersonaStore};
use counterforce_telemetry::{DegradationTag, DiagnosticSink};

use crate::election::resurface_probability;

/// Storage-backed retriever with embedding fallback.
pub struct MemoryRetriever {
    store: Arc<dyn PersonaStore>,
    embedder: Arc<dyn EmbeddingService>,
    sink: Arc<dyn DiagnosticSink>,
    clock: Arc<dyn Clock>,
    config: MemoryConfig,
    rng: Mutex<StdRng>,
}

impl MemoryRetriever {
    pub fn new(
        store: Arc<dyn PersonaStore>,
        embedder: Arc<dyn EmbeddingService>,
        sink: Arc<dyn DiagnosticSink>,
        clock: Arc<dyn Clock>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            sink,
            clock,
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Seeded variant so the preterite-resurfacing roll is deterministic
    /// in tests.
    pub fn with_seed(
        store: Arc<dyn PersonaStore>,
        embedder: Arc<dyn EmbeddingService>,
        sink: Arc<dyn DiagnosticSink>,
        clock: Arc<dyn Clock>,
        config: MemoryConfig,
        seed: u64,
    ) -> Self {
        Self {
            store,
            embedder,
            sink,
            clock,
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Retrieve up to `limit` memories for the pair, best first.
    pub async fn retrieve(
        &self,
        persona_id: &str,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Vec<MemoryRecord> {
        if limit == 0 {
            return Vec::new();
        }

        let mut results = match self.semantic_path(persona_id, user_id, query, limit).await {
            Some(results) if !results.is_empty() => results,
            _ => self.keyword_path(persona_id, user_id, query, limit).await,
        };

        self.maybe_resurface_preterite(persona_id, user_id, &mut results, limit)
            .await;
        results
    }

    /// Embed a memory's content for persistence. `None` on failure — the
    /// memory is stored without an embedding and keyword search still
    /// finds it.
    pub async fn try_embed(&self, text: &str) -> Option<Vec<f32>> {
        match self.embedder.embed(text).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                debug!(error = %e, "Embedding unavailable for stored memory");
                self.sink.report(
                    "memory",
                    DegradationTag::EmbeddingFailed,
                    Some(e.to_string()),
                );
                None
            }
        }
    }

    // --- Path 1: semantic ---

    /// `None` means "embedding unavailable — use the next path".
    async fn semantic_path(
        &self,
        persona_id: &str,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Option<Vec<MemoryRecord>> {
        let query_embedding = match self.embedder.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                debug!(error = %e, "Embedding failed, falling back to keyword retrieval");
                self.sink.report(
                    "memory",
                    DegradationTag::EmbeddingFailed,
                    Some(e.to_string()),
                );
                return None;
            }
        };

        // Over-fetch so the similarity floor doesn't starve the result set.
        let fetched = match self
            .store
            .similarity_search_memories(persona_id, user_id, &query_embedding, limit * 3)
            .await
        {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(error = %e, "Similarity search failed, falling back to keyword retrieval");
                self.sink.report(
                    "memory",
                    DegradationTag::StorageUnavailable,
                    Some(e.to_string()),
                );
                return None;
            }
        };

        let now = self.clock.now();
        let mut blended: Vec<MemoryRecord> = fetched
            .into_iter()
            .filter(|m| m.score >= self.config.min_similarity)
            .map(|mut m| {
                m.score = hybrid_score(m.score, &m, now, self.config.hybrid_weights);
                m
            })
            .collect();
        blended.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        blended.truncate(limit);
        Some(blended)
    }

    // --- Paths 2 and 3: keyword, then importance ---

    async fn keyword_path(
        &self,
        persona_id: &str,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Vec<MemoryRecord> {
        let tokens: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .filter(|t| t.chars().filter(|c| c.is_alphanumeric()).count() >= 3)
            .map(str::to_string)
            .collect();

        if tokens.is_empty() {
            return self.importance_path(persona_id, user_id, limit).await;
        }

        match self
            .store
            .keyword_search_memories(persona_id, user_id, &tokens, limit)
            .await
        {
            Ok(results) if !results.is_empty() => results,
            Ok(_) => self.importance_path(persona_id, user_id, limit).await,
            Err(e) => {
                warn!(error = %e, "Keyword search failed, falling back to importance ordering");
                self.sink.report(
                    "memory",
                    DegradationTag::StorageUnavailable,
                    Some(e.to_string()),
                );
                self.importance_path(persona_id, user_id, limit).await
            }
        }
    }

    async fn importance_path(
        &self,
        persona_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Vec<MemoryRecord> {
        match self.store.list_memories(persona_id, user_id, limit * 3).await {
            Ok(mut memories) => {
                memories.sort_by(|a, b| {
                    b.importance
                        .partial_cmp(&a.importance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(b.created_at.cmp(&a.created_at))
                });
                memories.truncate(limit);
                memories
            }
            Err(e) => {
                warn!(error = %e, "Importance-ordered listing failed, returning no memories");
                self.sink.report(
                    "memory",
                    DegradationTag::StorageUnavailable,
                    Some(e.to_string()),
                );
                Vec::new()
            }
        }
    }

    // --- Preterite resurfacing ---

    /// Rarely, a consigned memory comes back. One roll per retrieval
    /// against the newest preterite memory's decaying probability;
    /// failures here are silent — resurfacing is garnish, not contract.
    async fn maybe_resurface_preterite(
        &self,
        persona_id: &str,
        user_id: &str,
        results: &mut Vec<MemoryRecord>,
        limit: usize,
    ) {
        if results.len() >= limit {
            return;
        }
        let Ok(preterite) = self.store.list_preterite_memories(persona_id, user_id, 1).await
        else {
            return;
        };
        let Some(memory) = preterite.into_iter().next() else {
            return;
        };

        let probability = resurface_probability(memory.created_at, self.clock.now());
        let roll: f64 = self.rng.lock().unwrap().r#gen();
        if roll < probability {
            debug!(memory_id = %memory.id, probability, "Preterite memory resurfaced");
            results.push(memory);
        }
    }
}
