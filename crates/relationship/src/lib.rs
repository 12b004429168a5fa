//! Relationship tracker — the per (persona, user) trust state machine.
//!
//! Familiarity only moves through completed sessions. The per-session
//! delta is the base delta scaled by an engagement multiplier and hard
//! capped; trust level is recomputed from familiarity on every write so
//! the stored level can never disagree with the score.

use std::sync::Arc;

use tracing::{debug, warn};

use counterforce_config::RelationshipConfig;
use counterforce_core::clock::Clock;
use counterforce_core::relationship::{Relationship, TrustLevel};
use counterforce_core::session::SessionQuality;
use counterforce_store::PersonaStore;
use counterforce_telemetry::{DegradationTag, DiagnosticSink};

// ── Pure functions ────────────────────────────────────────────────────────

/// Map a familiarity score onto the four trust bands.
///
/// Bands: `< 0.2` stranger, `[0.2, 0.5)` acquaintance, `[0.5, 0.8)`
/// familiar, `>= 0.8` confidant.
pub fn calculate_trust_level(score: f64) -> TrustLevel {
    if score < 0.2 {
        TrustLevel::Stranger
    } else if score < 0.5 {
        TrustLevel::Acquaintance
    } else if score < 0.8 {
        TrustLevel::Familiar
    } else {
        TrustLevel::Confidant
    }
}

/// Turn measured session quality into an engagement multiplier, clamped
/// into `[engagement_floor, engagement_ceiling]`.
pub fn calculate_engagement_score(quality: &SessionQuality, config: &RelationshipConfig) -> f64 {
    // Saturating components: ten messages or thirty minutes each count as
    // "full" on their axis.
    let message_component = (quality.message_count as f64 / 10.0).min(1.0);
    let duration_component = (quality.duration_minutes / 30.0).min(1.0);
    let follow_up_component = if quality.has_follow_up { 1.0 } else { 0.0 };

    let raw = 0.6 * message_component
        + 0.7 * duration_component
        + 0.3 * follow_up_component
        + 0.4 * quality.topic_depth;

    raw.clamp(config.engagement_floor, config.engagement_ceiling)
}

/// The familiarity delta actually applied for one session.
pub fn calculate_effective_delta(engagement: f64, config: &RelationshipConfig) -> f64 {
    (config.base_delta * engagement).min(config.max_delta)
}

// ── Tracker ───────────────────────────────────────────────────────────────

/// Storage-backed relationship tracker.
pub struct RelationshipTracker {
    store: Arc<dyn PersonaStore>,
    sink: Arc<dyn DiagnosticSink>,
    clock: Arc<dyn Clock>,
    config: RelationshipConfig,
}

impl RelationshipTracker {
    pub fn new(
        store: Arc<dyn PersonaStore>,
        sink: Arc<dyn DiagnosticSink>,
        clock: Arc<dyn Clock>,
        config: RelationshipConfig,
    ) -> Self {
        Self {
            store,
            sink,
            clock,
            config,
        }
    }

    /// Get-or-create the relationship for a pair.
    ///
    /// On storage failure this returns an in-memory stranger default
    /// flagged `fallback` — the conversation proceeds, nothing is
    /// persisted, and the failure goes to the diagnostic sink.
    pub async fn ensure_relationship(&self, persona_id: &str, user_id: &str) -> Relationship {
        let now = self.clock.now();
        match self.store.get_relationship(persona_id, user_id).await {
            Ok(Some(existing)) => existing,
            Ok(None) => {
                let fresh = Relationship::stranger(persona_id, user_id, now);
                if let Err(e) = self.store.upsert_relationship(&fresh).await {
                    warn!(persona_id, user_id, error = %e, "Failed to persist first-contact relationship");
                    self.sink.report(
                        "relationship",
                        DegradationTag::StorageUnavailable,
                        Some(e.to_string()),
                    );
                    return Relationship::fallback_stranger(persona_id, user_id, now);
                }
                fresh
            }
            Err(e) => {
                warn!(persona_id, user_id, error = %e, "Relationship fetch failed, using stranger fallback");
                self.sink.report(
                    "relationship",
                    DegradationTag::StorageUnavailable,
                    Some(e.to_string()),
                );
                Relationship::fallback_stranger(persona_id, user_id, now)
            }
        }
    }

    /// Fold one completed session into the relationship.
    ///
    /// Familiarity is monotone non-decreasing and clamped to 1.0; the
    /// trust level is recomputed from the new score. If the final upsert
    /// fails the updated value is still returned, flagged `fallback`.
    pub async fn record_session(
        &self,
        persona_id: &str,
        user_id: &str,
        quality: &SessionQuality,
    ) -> Relationship {
        let mut relationship = self.ensure_relationship(persona_id, user_id).await;

        let engagement = calculate_engagement_score(quality, &self.config);
        let delta = calculate_effective_delta(engagement, &self.config);

        relationship.familiarity = (relationship.familiarity + delta).clamp(0.0, 1.0);
        relationship.trust_level = calculate_trust_level(relationship.familiarity);
        relationship.interaction_count += 1;
        relationship.updated_at = self.clock.now();

        debug!(
            persona_id,
            user_id,
            engagement,
            delta,
            familiarity = relationship.familiarity,
            trust = relationship.trust_level.as_str(),
            "Recorded session into relationship"
        );

        if relationship.fallback {
            // Never persist a fallback value; it was built on a failed read.
            return relationship;
        }

        if let Err(e) = self.store.upsert_relationship(&relationship).await {
            warn!(persona_id, user_id, error = %e, "Failed to persist relationship update");
            self.sink.report(
                "relationship",
                DegradationTag::StorageUnavailable,
                Some(e.to_string()),
            );
            relationship.fallback = true;
        }

        relationship
    }

    /// One-line relationship hint for context assembly, or `None` for a
    /// brand-new stranger with nothing to say yet.
    pub fn render_hint(relationship: &Relationship) -> Option<String> {
        if relationship.interaction_count == 0 {
            return None;
        }
        let mut hint = format!(
            "You are speaking with a {} ({} prior sessions).",
            relationship.trust_level.as_str(),
            relationship.interaction_count
        );
        if let Some(preferences) = &relationship.preferences {
            hint.push_str(&format!(" They prefer: {preferences}."));
        }
        if let Some(summary) = &relationship.summary {
            hint.push_str(&format!(" So far: {summary}"));
        }
        Some(hint)
    }

    pub fn config(&self) -> &RelationshipConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use counterforce_core::clock::FixedClock;
    use counterforce_store::MemoryStore;
    use counterforce_telemetry::MemorySink;

    fn quality(messages: usize, minutes: f64, follow_up: bool, depth: f64) -> SessionQuality {
        SessionQuality {
            message_count: messages,
            duration_minutes: minutes,
            has_follow_up: follow_up,
            topic_depth: depth,
        }
    }

    fn tracker(store: Arc<MemoryStore>, sink: Arc<MemorySink>) -> RelationshipTracker {
        RelationshipTracker::new(
            store,
            sink,
            Arc::new(FixedClock(Utc::now())),
            RelationshipConfig::default(),
        )
    }

    // ── Pure function properties ───────────────────────────────────────

    #[test]
    fn trust_bands_exact_at_boundaries() {
        assert_eq!(calculate_trust_level(0.0), TrustLevel::Stranger);
        assert_eq!(calculate_trust_level(0.19999), TrustLevel::Stranger);
        assert_eq!(calculate_trust_level(0.2), TrustLevel::Acquaintance);
        assert_eq!(calculate_trust_level(0.49999), TrustLevel::Acquaintance);
        assert_eq!(calculate_trust_level(0.5), TrustLevel::Familiar);
        assert_eq!(calculate_trust_level(0.79999), TrustLevel::Familiar);
        assert_eq!(calculate_trust_level(0.8), TrustLevel::Confidant);
        assert_eq!(calculate_trust_level(1.0), TrustLevel::Confidant);
    }

    #[test]
    fn trust_level_is_monotonic() {
        let mut previous = calculate_trust_level(0.0);
        for step in 0..=100 {
            let level = calculate_trust_level(step as f64 / 100.0);
            assert!(level >= previous, "trust regressed at {step}");
            previous = level;
        }
    }

    #[test]
    fn effective_delta_never_exceeds_cap() {
        let config = RelationshipConfig::default();
        for engagement in [0.0, 0.5, 1.0, 2.0, 10.0, 1000.0] {
            assert!(calculate_effective_delta(engagement, &config) <= config.max_delta);
        }
    }

    #[test]
    fn engagement_clamped_to_floor_and_ceiling() {
        let config = RelationshipConfig::default();
        let dead = quality(0, 0.0, false, 0.0);
        assert!((calculate_engagement_score(&dead, &config) - config.engagement_floor).abs() < 1e-12);

        let intense = quality(100, 500.0, true, 1.0);
        assert!(calculate_engagement_score(&intense, &config) <= config.engagement_ceiling);
    }

    #[test]
    fn richer_sessions_engage_more() {
        let config = RelationshipConfig::default();
        let thin = quality(2, 3.0, false, 0.0);
        let rich = quality(9, 25.0, true, 0.8);
        assert!(
            calculate_engagement_score(&rich, &config) > calculate_engagement_score(&thin, &config)
        );
    }

    // ── Tracker behavior ───────────────────────────────────────────────

    #[tokio::test]
    async fn ensure_creates_and_persists_stranger() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let tracker = tracker(store.clone(), sink);

        let rel = tracker.ensure_relationship("p1", "u1").await;
        assert_eq!(rel.trust_level, TrustLevel::Stranger);
        assert!(!rel.fallback);

        // Persisted: a second fetch sees the same row
        let stored = store.get_relationship("p1", "u1").await.unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn ensure_falls_back_on_storage_failure() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        store.set_failing(true);
        let tracker = tracker(store, sink.clone());

        let rel = tracker.ensure_relationship("p1", "u1").await;
        assert!(rel.fallback);
        assert_eq!(rel.trust_level, TrustLevel::Stranger);
        assert_eq!(
            sink.events_by_tag(&DegradationTag::StorageUnavailable).len(),
            1
        );
    }

    #[tokio::test]
    async fn record_session_applies_capped_delta_once() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let tracker = tracker(store.clone(), sink);

        let rich = quality(10, 40.0, true, 1.0);
        let rel = tracker.record_session("p1", "u1", &rich).await;
        let config = RelationshipConfig::default();
        assert!(rel.familiarity <= config.max_delta + 1e-12);
        assert_eq!(rel.interaction_count, 1);

        let again = tracker.record_session("p1", "u1", &rich).await;
        assert!(again.familiarity > rel.familiarity);
        assert_eq!(again.interaction_count, 2);
    }

    #[tokio::test]
    async fn familiarity_clamps_at_one() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let tracker = tracker(store.clone(), sink);

        let mut rel = Relationship::stranger("p1", "u1", Utc::now());
        rel.familiarity = 0.999;
        rel.trust_level = TrustLevel::Confidant;
        store.upsert_relationship(&rel).await.unwrap();

        let updated = tracker
            .record_session("p1", "u1", &quality(10, 40.0, true, 1.0))
            .await;
        assert!(updated.familiarity <= 1.0);
        assert_eq!(updated.trust_level, TrustLevel::Confidant);
    }

    #[tokio::test]
    async fn trust_always_matches_familiarity_after_update() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let tracker = tracker(store.clone(), sink);

        for _ in 0..20 {
            let rel = tracker
                .record_session("p1", "u1", &quality(8, 30.0, true, 0.6))
                .await;
            assert_eq!(rel.trust_level, calculate_trust_level(rel.familiarity));
        }
    }

    #[test]
    fn render_hint_skips_first_contact() {
        let rel = Relationship::stranger("p1", "u1", Utc::now());
        assert!(RelationshipTracker::render_hint(&rel).is_none());

        let mut seen = rel;
        seen.interaction_count = 3;
        seen.trust_level = TrustLevel::Acquaintance;
        seen.preferences = Some("short answers".into());
        let hint = RelationshipTracker::render_hint(&seen).unwrap();
        assert!(hint.contains("acquaintance"));
        assert!(hint.contains("3 prior sessions"));
        assert!(hint.contains("short answers"));
    }
}
