//! In-memory backend — useful for testing and ephemeral sessions.
//!
//! Also carries a failure switch: flip it and every call returns
//! `StoreError::Unavailable`, which is how engine tests exercise the
//! degraded paths without a real outage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use counterforce_core::error::StoreError;
use counterforce_core::memory::{ElectionStatus, MemoryRecord};
use counterforce_core::persona::{Persona, SoulValidation};
use counterforce_core::relationship::Relationship;
use counterforce_core::setting::UserSetting;
use counterforce_core::EntropyState;

use crate::vector::rank_by_similarity;
use crate::PersonaStore;

type PairKey = (String, String);

#[derive(Default)]
struct Inner {
    personas: HashMap<String, Persona>,
    validations: Vec<SoulValidation>,
    relationships: HashMap<PairKey, Relationship>,
    memories: Vec<MemoryRecord>,
    entropy: HashMap<PairKey, EntropyState>,
    last_active: HashMap<String, DateTime<Utc>>,
    completed_sessions: HashMap<String, DateTime<Utc>>,
    settings: HashMap<PairKey, UserSetting>,
}

/// An in-memory store backed by `RwLock`-guarded maps.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("simulated outage".into()))
        } else {
            Ok(())
        }
    }

    /// All recorded soul validations (test helper).
    pub async fn soul_validations(&self) -> Vec<SoulValidation> {
        self.inner.read().await.validations.clone()
    }

    /// Total stored memories regardless of election (test helper).
    pub async fn memory_count(&self) -> usize {
        self.inner.read().await.memories.len()
    }
}

fn key(persona_id: &str, user_id: &str) -> PairKey {
    (persona_id.to_string(), user_id.to_string())
}

#[async_trait]
impl PersonaStore for MemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get_persona(&self, id: &str) -> Result<Option<Persona>, StoreError> {
        self.check_available()?;
        Ok(self.inner.read().await.personas.get(id).cloned())
    }

    async fn get_persona_by_slug(&self, slug: &str) -> Result<Option<Persona>, StoreError> {
        self.check_available()?;
        Ok(self
            .inner
            .read()
            .await
            .personas
            .values()
            .find(|p| p.slug == slug)
            .cloned())
    }

    async fn upsert_persona(&self, persona: &Persona) -> Result<(), StoreError> {
        self.check_available()?;
        self.inner
            .write()
            .await
            .personas
            .insert(persona.id.clone(), persona.clone());
        Ok(())
    }

    async fn record_soul_validation(&self, validation: &SoulValidation) -> Result<(), StoreError> {
        self.check_available()?;
        self.inner.write().await.validations.push(validation.clone());
        Ok(())
    }

    async fn get_relationship(
        &self,
        persona_id: &str,
        user_id: &str,
    ) -> Result<Option<Relationship>, StoreError> {
        self.check_available()?;
        Ok(self
            .inner
            .read()
            .await
            .relationships
            .get(&key(persona_id, user_id))
            .cloned())
    }

    async fn upsert_relationship(&self, relationship: &Relationship) -> Result<(), StoreError> {
        self.check_available()?;
        self.inner.write().await.relationships.insert(
            key(&relationship.persona_id, &relationship.user_id),
            relationship.clone(),
        );
        Ok(())
    }

    async fn insert_memory(&self, memory: &MemoryRecord) -> Result<String, StoreError> {
        self.check_available()?;
        let mut memory = memory.clone();
        if memory.id.is_empty() {
            memory.id = Uuid::new_v4().to_string();
        }
        let id = memory.id.clone();
        self.inner.write().await.memories.push(memory);
        Ok(id)
    }

    async fn list_memories(
        &self,
        persona_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        let mut matching: Vec<MemoryRecord> = inner
            .memories
            .iter()
            .filter(|m| {
                m.persona_id == persona_id && m.user_id == user_id && m.is_retrievable()
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn keyword_search_memories(
        &self,
        persona_id: &str,
        user_id: &str,
        tokens: &[String],
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        self.check_available()?;
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        let inner = self.inner.read().await;
        let mut matching: Vec<MemoryRecord> = inner
            .memories
            .iter()
            .filter(|m| m.persona_id == persona_id && m.user_id == user_id && m.is_retrievable())
            .filter_map(|m| {
                let content = m.content.to_lowercase();
                let hits = lowered.iter().filter(|t| content.contains(t.as_str())).count();
                if hits == 0 {
                    return None;
                }
                let mut scored = m.clone();
                scored.score = hits as f64 / lowered.len() as f64;
                Some(scored)
            })
            .collect();
        matching.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.created_at.cmp(&a.created_at))
        });
        matching.truncate(limit);
        Ok(matching)
    }

    async fn similarity_search_memories(
        &self,
        persona_id: &str,
        user_id: &str,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        let candidates: Vec<MemoryRecord> = inner
            .memories
            .iter()
            .filter(|m| m.persona_id == persona_id && m.user_id == user_id && m.is_retrievable())
            .cloned()
            .collect();
        Ok(rank_by_similarity(&candidates, query_embedding, limit))
    }

    async fn list_preterite_memories(
        &self,
        persona_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        let mut matching: Vec<MemoryRecord> = inner
            .memories
            .iter()
            .filter(|m| {
                m.persona_id == persona_id
                    && m.user_id == user_id
                    && m.election == ElectionStatus::Preterite
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn update_memory_election(
        &self,
        id: &str,
        election: ElectionStatus,
        content: &str,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        match inner.memories.iter_mut().find(|m| m.id == id) {
            Some(memory) => {
                memory.election = election;
                memory.content = content.to_string();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "memory".into(),
                id: id.into(),
            }),
        }
    }

    async fn get_entropy(
        &self,
        persona_id: &str,
        user_id: &str,
    ) -> Result<Option<EntropyState>, StoreError> {
        self.check_available()?;
        Ok(self
            .inner
            .read()
            .await
            .entropy
            .get(&key(persona_id, user_id))
            .cloned())
    }

    async fn upsert_entropy(&self, state: &EntropyState) -> Result<(), StoreError> {
        self.check_available()?;
        self.inner
            .write()
            .await
            .entropy
            .insert(key(&state.persona_id, &state.user_id), state.clone());
        Ok(())
    }

    async fn get_last_active(&self, persona_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.check_available()?;
        Ok(self.inner.read().await.last_active.get(persona_id).copied())
    }

    async fn set_last_active(
        &self,
        persona_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        self.inner
            .write()
            .await
            .last_active
            .insert(persona_id.to_string(), at);
        Ok(())
    }

    async fn session_completed(&self, session_id: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self
            .inner
            .read()
            .await
            .completed_sessions
            .contains_key(session_id))
    }

    async fn mark_session_completed(
        &self,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        self.inner
            .write()
            .await
            .completed_sessions
            .insert(session_id.to_string(), at);
        Ok(())
    }

    async fn get_user_setting(
        &self,
        persona_id: &str,
        user_id: &str,
    ) -> Result<Option<UserSetting>, StoreError> {
        self.check_available()?;
        Ok(self
            .inner
            .read()
            .await
            .settings
            .get(&key(persona_id, user_id))
            .cloned())
    }

    async fn upsert_user_setting(&self, setting: &UserSetting) -> Result<(), StoreError> {
        self.check_available()?;
        self.inner
            .write()
            .await
            .settings
            .insert(key(&setting.persona_id, &setting.user_id), setting.clone());
        Ok(())
    }
}
