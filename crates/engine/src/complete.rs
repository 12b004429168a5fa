//! Session completion — the idempotent end-of-session mutation path.
//!
//! One idempotency check gates everything: a session id that already
//! carries a completion marker returns a skipped outcome with zero
//! mutation. The marker is written immediately after the check passes,
//! so a retried completion after a mid-path failure skips rather than
//! double-applying. Decay touches are fire-and-forget: their individual
//! failures are logged, reported, and swallowed.

use tracing::{debug, info, warn};

use counterforce_atmosphere::{apply_temporal_decay, phase_multipliers, session_increment};
use counterforce_core::memory::{ElectionStatus, MemoryKind, MemoryRecord};
use counterforce_core::session::{SessionOutcome, SessionQuality, SessionRecord};
use counterforce_core::EntropyState;
use counterforce_memory::{
    calculate_election_score, classify_election, degrade_content, extract_candidates,
};
use counterforce_telemetry::DegradationTag;

use crate::setting::extract_setting_hints;
use crate::ContextEngine;

impl ContextEngine {
    /// Complete a session: extract and classify memories, update the
    /// relationship, touch the decay subsystems.
    ///
    /// Always returns a well-formed outcome. Unexpected internal failure
    /// is reported in `outcome.error`; mutations already applied stand.
    pub async fn complete_session(&self, record: &SessionRecord) -> SessionOutcome {
        let quality = SessionQuality::measure(record);

        // ── Idempotency gate ───────────────────────────────────────────
        match self.store.session_completed(&record.session_id).await {
            Ok(true) => {
                debug!(session_id = %record.session_id, "Session already completed, skipping");
                let relationship = self
                    .relationships
                    .ensure_relationship(&record.persona_id, &record.user_id)
                    .await;
                return SessionOutcome {
                    relationship,
                    memories_stored: 0,
                    memories_consigned_to_preterite: 0,
                    session_quality: quality,
                    settings_extracted: false,
                    skipped: true,
                    error: None,
                };
            }
            Ok(false) => {}
            Err(e) => {
                warn!(session_id = %record.session_id, error = %e, "Completion marker check failed");
                self.sink.report(
                    "completion",
                    DegradationTag::StorageUnavailable,
                    Some(e.to_string()),
                );
                return self.errored_outcome(record, quality, e.to_string()).await;
            }
        }

        // Mark first: a retry after any partial failure below must skip,
        // not double-apply.
        if let Err(e) = self
            .store
            .mark_session_completed(&record.session_id, self.clock.now())
            .await
        {
            warn!(session_id = %record.session_id, error = %e, "Could not write completion marker");
            self.sink.report(
                "completion",
                DegradationTag::StorageUnavailable,
                Some(e.to_string()),
            );
            return self.errored_outcome(record, quality, e.to_string()).await;
        }

        // ── Memory extraction and election ─────────────────────────────
        let extraction = extract_candidates(record, &self.config.memory);
        if extraction.dropped_low_confidence > 0 {
            self.sink.report(
                "memory",
                DegradationTag::ExtractionLowConfidence,
                Some(format!(
                    "{} candidate(s) below the importance gate",
                    extraction.dropped_low_confidence
                )),
            );
        }

        let insight_bonus = self
            .current_arc(&record.session_id)
            .map(|arc| phase_multipliers(&arc).insight_bonus)
            .unwrap_or(0.0);

        let now = self.clock.now();
        let mut memories_stored = 0usize;
        let mut memories_consigned = 0usize;

        for candidate in &extraction.candidates {
            let importance = if candidate.kind == MemoryKind::Insight {
                (candidate.importance + insight_bonus).min(1.0)
            } else {
                candidate.importance
            };

            let score = calculate_election_score(&candidate.content, importance, now, now);
            let election = classify_election(score);

            let mut memory = MemoryRecord::new(
                &record.persona_id,
                &record.user_id,
                &candidate.content,
                candidate.kind,
                importance,
                now,
            );
            memory.election = election;

            match election {
                ElectionStatus::Elect | ElectionStatus::Borderline => {
                    memory.embedding = self.retriever.try_embed(&candidate.content).await;
                    match self.store.insert_memory(&memory).await {
                        Ok(_) => memories_stored += 1,
                        Err(e) => {
                            warn!(error = %e, "Failed to store memory");
                            self.sink.report(
                                "memory",
                                DegradationTag::StorageUnavailable,
                                Some(e.to_string()),
                            );
                        }
                    }
                }
                ElectionStatus::Preterite => {
                    // The elect are recorded; the preterite are passed
                    // over, keeping only fragments.
                    memory.content = {
                        let mut rng = self.rng.lock().unwrap();
                        degrade_content(&candidate.content, &mut *rng)
                    };
                    match self.store.insert_memory(&memory).await {
                        Ok(_) => memories_consigned += 1,
                        Err(e) => {
                            warn!(error = %e, "Failed to consign preterite memory");
                            self.sink.report(
                                "memory",
                                DegradationTag::StorageUnavailable,
                                Some(e.to_string()),
                            );
                        }
                    }
                }
            }
        }

        // ── Relationship update ────────────────────────────────────────
        let relationship = self
            .relationships
            .record_session(&record.persona_id, &record.user_id, &quality)
            .await;

        // ── Decay touches: best-effort, fire-and-forget ────────────────
        self.touch_temporal(record).await;
        self.touch_entropy(record).await;

        // ── Setting hints ──────────────────────────────────────────────
        let settings_extracted = self.extract_and_save_settings(record).await;

        // The session's narrative arc is done with.
        self.clear_arc(&record.session_id);

        info!(
            session_id = %record.session_id,
            memories_stored,
            memories_consigned,
            familiarity = relationship.familiarity,
            "Session completed"
        );

        SessionOutcome {
            relationship,
            memories_stored,
            memories_consigned_to_preterite: memories_consigned,
            session_quality: quality,
            settings_extracted,
            skipped: false,
            error: None,
        }
    }

    async fn errored_outcome(
        &self,
        record: &SessionRecord,
        quality: SessionQuality,
        error: String,
    ) -> SessionOutcome {
        let relationship = self
            .relationships
            .ensure_relationship(&record.persona_id, &record.user_id)
            .await;
        SessionOutcome {
            relationship,
            memories_stored: 0,
            memories_consigned_to_preterite: 0,
            session_quality: quality,
            settings_extracted: false,
            skipped: false,
            error: Some(error),
        }
    }

    async fn touch_temporal(&self, record: &SessionRecord) {
        if let Err(e) = self
            .store
            .set_last_active(&record.persona_id, record.ended_at)
            .await
        {
            debug!(error = %e, "Temporal touch failed");
            self.sink.report(
                "temporal",
                DegradationTag::CompletionTouchFailed,
                Some(e.to_string()),
            );
        }
    }

    async fn touch_entropy(&self, record: &SessionRecord) {
        let now = self.clock.now();
        let current = match self.store.get_entropy(&record.persona_id, &record.user_id).await {
            Ok(Some(state)) => state,
            Ok(None) => EntropyState::new(&record.persona_id, &record.user_id, now),
            Err(e) => {
                debug!(error = %e, "Entropy read failed");
                self.sink.report(
                    "entropy",
                    DegradationTag::CompletionTouchFailed,
                    Some(e.to_string()),
                );
                return;
            }
        };

        let decayed = apply_temporal_decay(
            current.value,
            current.updated_at,
            now,
            self.config.atmosphere.entropy_decay_rate,
        );
        let modifier = self
            .current_arc(&record.session_id)
            .map(|arc| phase_multipliers(&arc).entropy_modifier)
            .unwrap_or(1.0);
        let session_delta = self.config.atmosphere.entropy_session_delta * modifier;

        let raised = {
            let mut rng = self.rng.lock().unwrap();
            session_increment(decayed, session_delta, &mut *rng)
        };

        let updated = EntropyState {
            value: raised,
            updated_at: now,
            ..current
        };
        if let Err(e) = self.store.upsert_entropy(&updated).await {
            debug!(error = %e, "Entropy write failed");
            self.sink.report(
                "entropy",
                DegradationTag::CompletionTouchFailed,
                Some(e.to_string()),
            );
        }
    }

    async fn extract_and_save_settings(&self, record: &SessionRecord) -> bool {
        let Some(hints) = extract_setting_hints(&record.messages) else {
            return false;
        };
        let mut setting = self
            .load_user_settings(&record.persona_id, &record.user_id)
            .await;
        if !hints.merge_into(&mut setting) {
            return false;
        }
        match self.save_user_settings(&setting).await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Setting save failed");
                self.sink.report(
                    "setting",
                    DegradationTag::CompletionTouchFailed,
                    Some(e.to_string()),
                );
                false
            }
        }
    }
}
