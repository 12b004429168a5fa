//! Persona and soul types.
//!
//! A persona is a configured conversational identity. Its *soul* is the
//! read-only reference-voice artifact: the voice content plus an integrity
//! hash. The engine never mutates a soul; it only verifies the hash and
//! records validation results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A configured conversational identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    /// Stable identifier (row id in the persona store).
    pub id: String,

    /// URL-safe short name, e.g. `"slothrop"`.
    pub slug: String,

    /// Display name used in corrective directives.
    pub name: String,

    /// The reference-voice definition artifact.
    pub soul: SoulDefinition,

    /// Per-persona drift-check configuration.
    #[serde(default)]
    pub drift_config: DriftConfig,
}

/// The read-only persona definition artifact: voice content + integrity hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoulDefinition {
    /// The full reference-voice text, including marker sections.
    pub content: String,

    /// Hex-encoded SHA-256 of `content`, computed by the authoring process.
    pub integrity_hash: String,

    /// Authoring version, bumped on every re-author.
    pub version: u32,
}

/// Markers derived from a soul's content, consumed by drift analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceMarkers {
    /// Vocabulary the persona is expected to use.
    #[serde(default)]
    pub vocabulary: Vec<String>,

    /// Phrases the persona must never produce.
    #[serde(default)]
    pub forbidden_phrases: Vec<String>,

    /// Structural regex patterns whose *match* counts as a violation
    /// (e.g. bullet-list openings for a persona that speaks in prose).
    #[serde(default)]
    pub structural_patterns: Vec<String>,
}

impl VoiceMarkers {
    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
            && self.forbidden_phrases.is_empty()
            && self.structural_patterns.is_empty()
    }
}

/// Per-persona drift-check configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    /// Whether drift checking runs at all for this persona.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Severity threshold separating MINOR from WARNING.
    #[serde(default = "default_threshold")]
    pub severity_threshold: f64,
}

fn default_enabled() -> bool {
    true
}

fn default_threshold() -> f64 {
    0.3
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            severity_threshold: 0.3,
        }
    }
}

/// Result of a soul integrity check, recorded back to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoulValidation {
    pub persona_id: String,
    pub valid: bool,
    pub checked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
