//! # Counterforce Engine
//!
//! The context orchestrator. Each conversational turn calls
//! [`ContextEngine::assemble_context`], which verifies soul integrity,
//! pulls every optional sub-context through one fail-safe wrapper, and
//! composes a bounded system prompt. At session end,
//! [`ContextEngine::complete_session`] runs the idempotent mutation path:
//! memory extraction and election, the relationship update, and
//! best-effort decay touches.
//!
//! Both entry points always return well-formed values. Subsystem failure
//! degrades; it never propagates.

pub mod assemble;
pub mod complete;
mod provider;
pub mod setting;
pub mod token;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::warn;

use counterforce_config::EngineConfig;
use counterforce_core::clock::Clock;
use counterforce_core::decay::NarrativeArc;
use counterforce_core::error::Error;
use counterforce_core::setting::UserSetting;
use counterforce_memory::MemoryRetriever;
use counterforce_relationship::RelationshipTracker;
use counterforce_store::{EmbeddingService, PersonaStore};
use counterforce_telemetry::{DegradationTag, DiagnosticSink};

pub use assemble::{AssembleOptions, AssembleRequest, AssembledContext, ContextMetadata};

/// The composition root's engine handle.
///
/// Construct once with an injected store, embedder, sink, and clock;
/// reuse across calls. Holds no per-request state besides the in-process
/// narrative arcs.
pub struct ContextEngine {
    store: Arc<dyn PersonaStore>,
    sink: Arc<dyn DiagnosticSink>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    relationships: RelationshipTracker,
    retriever: MemoryRetriever,
    /// Per-session narrative arcs, reset at session completion.
    arcs: Mutex<HashMap<String, NarrativeArc>>,
    rng: Mutex<StdRng>,
}

impl ContextEngine {
    pub fn new(
        store: Arc<dyn PersonaStore>,
        embedder: Arc<dyn EmbeddingService>,
        sink: Arc<dyn DiagnosticSink>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let relationships = RelationshipTracker::new(
            store.clone(),
            sink.clone(),
            clock.clone(),
            config.relationship.clone(),
        );
        let retriever = MemoryRetriever::new(
            store.clone(),
            embedder,
            sink.clone(),
            clock.clone(),
            config.memory.clone(),
        );
        Self {
            store,
            sink,
            clock,
            config,
            relationships,
            retriever,
            arcs: Mutex::new(HashMap::new()),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Seeded variant: deterministic entropy events, artifact choices,
    /// and preterite redaction. For tests.
    pub fn with_seed(
        store: Arc<dyn PersonaStore>,
        embedder: Arc<dyn EmbeddingService>,
        sink: Arc<dyn DiagnosticSink>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
        seed: u64,
    ) -> Self {
        let relationships = RelationshipTracker::new(
            store.clone(),
            sink.clone(),
            clock.clone(),
            config.relationship.clone(),
        );
        let retriever = MemoryRetriever::with_seed(
            store.clone(),
            embedder,
            sink.clone(),
            clock.clone(),
            config.memory.clone(),
            seed,
        );
        Self {
            store,
            sink,
            clock,
            config,
            relationships,
            retriever,
            arcs: Mutex::new(HashMap::new()),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── User settings ─────────────────────────────────────────────────

    /// Persist a user setting.
    pub async fn save_user_settings(&self, setting: &UserSetting) -> Result<(), Error> {
        let mut stamped = setting.clone();
        stamped.updated_at = Some(self.clock.now());
        self.store.upsert_user_setting(&stamped).await?;
        Ok(())
    }

    /// Load the stored setting, or a fresh default-backed one when none
    /// exists or the store is down.
    pub async fn load_user_settings(&self, persona_id: &str, user_id: &str) -> UserSetting {
        match self.store.get_user_setting(persona_id, user_id).await {
            Ok(Some(setting)) => setting,
            Ok(None) => UserSetting::new(persona_id, user_id),
            Err(e) => {
                warn!(persona_id, user_id, error = %e, "Setting fetch failed, using defaults");
                self.sink.report(
                    "setting",
                    DegradationTag::StorageUnavailable,
                    Some(e.to_string()),
                );
                UserSetting::new(persona_id, user_id)
            }
        }
    }

    /// The compiled scene line, defaults applied for unset fields.
    pub async fn compile_user_setting(&self, persona_id: &str, user_id: &str) -> String {
        self.load_user_settings(persona_id, user_id).await.compile()
    }
}
