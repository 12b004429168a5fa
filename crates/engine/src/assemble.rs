//! Context assembly — one bounded prompt per turn.
//!
//! Assembly order, highest priority first:
//!
//! 1. **Voice correction** (drift pipeline, previous turn)
//! 2. **Relationship** (trust hint)
//! 3. **Setting** (compiled scene)
//! 4. **Atmosphere** (entropy, narrative, temporal, paranoia layers)
//! 5. **Memories** — lowest priority, truncated first under pressure
//!
//! The persona's soul content is the base of the prompt and is never
//! trimmed. The integrity gate runs before any other fetch: a hash
//! mismatch returns an empty context and skips everything else, the one
//! case where the engine withholds output instead of degrading.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use counterforce_atmosphere::{
    apply_temporal_decay, standard_layers, ContextLayer, EntropyLayer, LayerInput, NarrativeLayer,
    TemporalLayer,
};
use counterforce_core::decay::{NarrativeArc, TemporalGap};
use counterforce_core::drift::DriftSeverity;
use counterforce_core::persona::Persona;
use counterforce_core::relationship::TrustLevel;
use counterforce_drift::{analyze_drift, generate_drift_correction, validate_soul};
use counterforce_memory::select_memories;
use counterforce_relationship::RelationshipTracker;
use counterforce_telemetry::DegradationTag;

use crate::provider::fetch_or_null;
use crate::token::{estimate_tokens, truncate_to_tokens};
use crate::ContextEngine;

/// Component names in priority order, highest first. Truncation under
/// the total budget walks this list from the tail.
const PRIORITY: &[&str] = &[
    "drift_correction",
    "relationship",
    "setting",
    "ambient",
    "memories",
];

/// Per-turn assembly options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembleOptions {
    /// Include the compiled user setting.
    pub include_setting: bool,

    /// Include the four thematic paranoia/resistance layers.
    pub include_pynchon: bool,

    /// Override the configured total token budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            include_setting: true,
            include_pynchon: true,
            max_tokens: None,
        }
    }
}

/// One turn's assembly request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembleRequest {
    pub persona_id: String,

    /// Fallback lookup key when `persona_id` misses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_slug: Option<String>,

    pub user_id: String,
    pub query: String,
    pub session_id: String,

    /// The previous raw response; presence triggers the drift pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response: Option<String>,

    #[serde(default)]
    pub options: AssembleOptions,
}

/// Assembly metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMetadata {
    pub session_id: String,

    /// Trust level of the pair; `None` when the relationship could not
    /// be established at all.
    pub trust_level: Option<TrustLevel>,

    pub total_tokens: usize,
    pub truncated: bool,

    /// Drift score of the previous response; `None` when no previous
    /// response was supplied.
    pub drift_score: Option<f64>,

    pub assembly_duration_ms: u64,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub soul_integrity_failure: bool,
}

/// The assembled, bounded context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledContext {
    pub system_prompt: String,

    /// What each provider contributed, post-truncation. `None` means the
    /// provider had nothing or failed.
    pub components: BTreeMap<String, Option<String>>,

    pub metadata: ContextMetadata,
}

fn empty_components() -> BTreeMap<String, Option<String>> {
    PRIORITY.iter().map(|name| (name.to_string(), None)).collect()
}

fn section_heading(name: &str) -> &'static str {
    match name {
        "drift_correction" => "[Voice Correction]",
        "relationship" => "[Relationship]",
        "setting" => "[Setting]",
        "ambient" => "[Atmosphere]",
        _ => "[Memories]",
    }
}

impl ContextEngine {
    /// Assemble the bounded context for one turn.
    ///
    /// Always returns a well-formed result. Total sub-fetch failure
    /// produces the minimal catastrophic-fallback context; only a soul
    /// integrity mismatch returns an intentionally empty one.
    pub async fn assemble_context(&self, request: &AssembleRequest) -> AssembledContext {
        let started = Instant::now();

        // ── Persona load ───────────────────────────────────────────────
        let Some(persona) = self.load_persona(request).await else {
            return self.catastrophic_fallback(request, started);
        };

        // ── Integrity gate: fail closed on mismatch ────────────────────
        match validate_soul(&persona, self.clock.now()) {
            Ok(validation) => {
                if let Err(e) = self.store.record_soul_validation(&validation).await {
                    debug!(error = %e, "Could not record soul validation");
                }
            }
            Err(e) => {
                self.sink.report(
                    "soul",
                    DegradationTag::IntegrityFailure,
                    Some(e.to_string()),
                );
                let failed = counterforce_core::persona::SoulValidation {
                    persona_id: persona.id.clone(),
                    valid: false,
                    checked_at: self.clock.now(),
                    detail: Some(e.to_string()),
                };
                if let Err(e) = self.store.record_soul_validation(&failed).await {
                    debug!(error = %e, "Could not record failed soul validation");
                }
                return AssembledContext {
                    system_prompt: String::new(),
                    components: empty_components(),
                    metadata: ContextMetadata {
                        session_id: request.session_id.clone(),
                        trust_level: None,
                        total_tokens: 0,
                        truncated: false,
                        drift_score: None,
                        assembly_duration_ms: started.elapsed().as_millis() as u64,
                        soul_integrity_failure: true,
                    },
                };
            }
        }

        // ── Narrative arc advances with every turn ─────────────────────
        let arc = self.advance_arc(&request.session_id, &request.query);

        // ── Drift pipeline (previous turn's response) ──────────────────
        let (drift_score, drift_correction) = match &request.previous_response {
            Some(previous) => {
                let analysis = analyze_drift(previous, &persona, &self.config.drift);
                if analysis.severity >= DriftSeverity::Warning {
                    debug!(
                        score = analysis.score,
                        severity = ?analysis.severity,
                        "Voice drift detected"
                    );
                }
                let correction = generate_drift_correction(&analysis, &persona.name);
                (Some(analysis.score), correction)
            }
            None => (None, None),
        };

        // ── Optional providers, each under the fetch-or-null contract ──
        let relationship = self
            .relationships
            .ensure_relationship(&persona.id, &request.user_id)
            .await;
        let trust_level = Some(relationship.trust_level);

        let relationship_text = fetch_or_null("relationship", &self.sink, || async {
            Ok(RelationshipTracker::render_hint(&relationship))
        })
        .await;

        let memories_text = fetch_or_null("memories", &self.sink, || async {
            let retrieved = self
                .retriever
                .retrieve(
                    &persona.id,
                    &request.user_id,
                    &request.query,
                    self.config.memory.retrieval_limit * 2,
                )
                .await;
            let selected = select_memories(
                &retrieved,
                &request.query,
                self.config.memory.retrieval_limit,
            );
            if selected.is_empty() {
                return Ok(None);
            }
            let lines: Vec<String> = selected
                .iter()
                .map(|memory| format!("- {}", memory.content))
                .collect();
            Ok(Some(lines.join("\n")))
        })
        .await;

        let setting_text = if request.options.include_setting {
            fetch_or_null("setting", &self.sink, || async {
                let setting = self.store.get_user_setting(&persona.id, &request.user_id).await?;
                Ok(Some(
                    setting
                        .unwrap_or_else(|| {
                            counterforce_core::setting::UserSetting::new(
                                &persona.id,
                                &request.user_id,
                            )
                        })
                        .compile(),
                ))
            })
            .await
        } else {
            None
        };

        let ambient_text = fetch_or_null("ambient", &self.sink, || async {
            Ok(self.render_ambient(request, &persona, &arc).await)
        })
        .await;

        // ── Composition under budget ───────────────────────────────────
        let mut components = empty_components();
        components.insert("drift_correction".into(), drift_correction);
        components.insert("relationship".into(), relationship_text);
        components.insert("setting".into(), setting_text);
        components.insert("ambient".into(), ambient_text);
        components.insert("memories".into(), memories_text);

        let total_budget = request
            .options
            .max_tokens
            .unwrap_or(self.config.budget.total_tokens);
        let mut truncated = false;

        // Per-component caps first
        for name in PRIORITY {
            let cap = self.component_budget(name);
            if let Some(Some(text)) = components.get_mut(*name).map(Option::as_mut) {
                let (capped, was_cut) = truncate_to_tokens(text, cap);
                if was_cut {
                    *text = capped;
                    truncated = true;
                }
            }
        }

        // Then the total budget, trimming lowest priority first
        let base_tokens = estimate_tokens(&persona.soul.content);
        let mut used: usize = base_tokens
            + PRIORITY
                .iter()
                .filter_map(|name| {
                    components
                        .get(*name)
                        .and_then(Option::as_ref)
                        .map(|text| estimate_tokens(text) + estimate_tokens(section_heading(name)))
                })
                .sum::<usize>();

        for name in PRIORITY.iter().rev() {
            if used <= total_budget {
                break;
            }
            let Some(slot) = components.get_mut(*name) else {
                continue;
            };
            let Some(text) = slot.as_ref() else {
                continue;
            };
            let text_tokens = estimate_tokens(text);
            let overflow = used - total_budget;
            if text_tokens <= overflow {
                used -= text_tokens;
                *slot = None;
            } else {
                let (shrunk, _) = truncate_to_tokens(text, text_tokens - overflow);
                used -= text_tokens - estimate_tokens(&shrunk);
                *slot = Some(shrunk);
            }
            truncated = true;
        }

        // ── Final prompt ───────────────────────────────────────────────
        let mut prompt = persona.soul.content.trim().to_string();
        for name in PRIORITY {
            if let Some(Some(text)) = components.get(*name).map(Option::as_ref) {
                prompt.push_str("\n\n");
                prompt.push_str(section_heading(name));
                prompt.push('\n');
                prompt.push_str(text);
            }
        }

        let total_tokens = estimate_tokens(&prompt);
        AssembledContext {
            system_prompt: prompt,
            components,
            metadata: ContextMetadata {
                session_id: request.session_id.clone(),
                trust_level,
                total_tokens,
                truncated,
                drift_score,
                assembly_duration_ms: started.elapsed().as_millis() as u64,
                soul_integrity_failure: false,
            },
        }
    }

    // ── Helpers ────────────────────────────────────────────────────────

    async fn load_persona(&self, request: &AssembleRequest) -> Option<Persona> {
        match self.store.get_persona(&request.persona_id).await {
            Ok(Some(persona)) => return Some(persona),
            Ok(None) => {}
            Err(e) => {
                warn!(persona_id = %request.persona_id, error = %e, "Persona fetch failed");
                self.sink.report(
                    "persona",
                    DegradationTag::StorageUnavailable,
                    Some(e.to_string()),
                );
                return None;
            }
        }
        let slug = request.persona_slug.as_deref()?;
        match self.store.get_persona_by_slug(slug).await {
            Ok(persona) => persona,
            Err(e) => {
                warn!(slug, error = %e, "Persona slug fetch failed");
                self.sink.report(
                    "persona",
                    DegradationTag::StorageUnavailable,
                    Some(e.to_string()),
                );
                None
            }
        }
    }

    /// The minimal context emitted when even the persona cannot be
    /// loaded. The conversation continues; nothing pretends otherwise.
    fn catastrophic_fallback(
        &self,
        request: &AssembleRequest,
        started: Instant,
    ) -> AssembledContext {
        self.sink.report(
            "engine",
            DegradationTag::CatastrophicFallback,
            Some(format!("persona {} unavailable", request.persona_id)),
        );
        let name = request
            .persona_slug
            .as_deref()
            .unwrap_or(&request.persona_id);
        let prompt = format!(
            "You are {name}. Speak in your own established voice. \
             Your memory of this person is temporarily out of reach; \
             stay present and let the conversation carry itself."
        );
        let total_tokens = estimate_tokens(&prompt);
        AssembledContext {
            system_prompt: prompt,
            components: empty_components(),
            metadata: ContextMetadata {
                session_id: request.session_id.clone(),
                trust_level: None,
                total_tokens,
                truncated: false,
                drift_score: None,
                assembly_duration_ms: started.elapsed().as_millis() as u64,
                soul_integrity_failure: false,
            },
        }
    }

    fn component_budget(&self, name: &str) -> usize {
        match name {
            "drift_correction" => self.config.budget.drift_correction,
            "relationship" => self.config.budget.relationship,
            "setting" => self.config.budget.setting,
            "ambient" => self.config.budget.ambient,
            _ => self.config.budget.memories,
        }
    }

    pub(crate) fn advance_arc(&self, session_id: &str, message: &str) -> NarrativeArc {
        let mut arcs = self.arcs.lock().unwrap();
        let current = arcs.entry(session_id.to_string()).or_default();
        let updated = counterforce_atmosphere::update_arc(current, message);
        *current = updated.clone();
        updated
    }

    pub(crate) fn current_arc(&self, session_id: &str) -> Option<NarrativeArc> {
        self.arcs.lock().unwrap().get(session_id).cloned()
    }

    pub(crate) fn clear_arc(&self, session_id: &str) {
        self.arcs.lock().unwrap().remove(session_id);
    }

    /// Gather the atmosphere layers' snippets. Store failures inside are
    /// degraded per-signal so one outage cannot silence the others.
    async fn render_ambient(
        &self,
        request: &AssembleRequest,
        persona: &Persona,
        arc: &NarrativeArc,
    ) -> Option<String> {
        let now = self.clock.now();

        let entropy = match self.store.get_entropy(&persona.id, &request.user_id).await {
            Ok(Some(state)) => apply_temporal_decay(
                state.value,
                state.updated_at,
                now,
                self.config.atmosphere.entropy_decay_rate,
            ),
            Ok(None) => 0.0,
            Err(e) => {
                self.sink.report(
                    "entropy",
                    DegradationTag::StorageUnavailable,
                    Some(e.to_string()),
                );
                0.0
            }
        };

        let gap = match self.store.get_last_active(&persona.id).await {
            Ok(Some(last_active)) => {
                TemporalGap::from_elapsed_ms((now - last_active).num_milliseconds())
            }
            Ok(None) => TemporalGap::None,
            Err(e) => {
                self.sink.report(
                    "temporal",
                    DegradationTag::StorageUnavailable,
                    Some(e.to_string()),
                );
                TemporalGap::None
            }
        };

        let input = LayerInput {
            query: &request.query,
            entropy,
            gap,
            arc,
            persona_name: &persona.name,
        };

        let atmosphere = &self.config.atmosphere;
        let mut layers: Vec<Box<dyn ContextLayer>> = vec![
            Box::new(EntropyLayer::new(atmosphere.clone())),
            Box::new(NarrativeLayer::new(atmosphere.clone())),
            Box::new(TemporalLayer::new(atmosphere.clone())),
        ];
        if request.options.include_pynchon {
            for layer in standard_layers(atmosphere) {
                layers.push(Box::new(layer));
            }
        }

        let mut rng = self.rng.lock().unwrap();
        let snippets: Vec<String> = layers
            .iter()
            .filter_map(|layer| layer.emit(&input, &mut rng))
            .collect();

        if snippets.is_empty() {
            None
        } else {
            Some(snippets.join("\n"))
        }
    }
}
