//! Soul validation and marker extraction.
//!
//! A soul is the read-only persona definition: voice content plus the
//! SHA-256 hash the authoring process computed over it. Validation
//! recomputes the hash; a mismatch is the engine's one fail-closed case,
//! because it signals tampering rather than unavailability.
//!
//! Marker sections inside the content use markdown headings:
//!
//! ```text
//! ## Vocabulary
//! - rocket
//! - zone
//!
//! ## Forbidden Phrases
//! - happy to help
//!
//! ## Structural Patterns
//! - (?m)^\s*[-*] .+
//! ```

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::warn;

use counterforce_core::error::SoulError;
use counterforce_core::persona::{Persona, SoulValidation, VoiceMarkers};

const VOCABULARY_HEADING: &str = "## vocabulary";
const FORBIDDEN_HEADING: &str = "## forbidden phrases";
const PATTERNS_HEADING: &str = "## structural patterns";

/// Hex-encoded SHA-256 of soul content.
pub fn compute_integrity_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Verify a persona's soul against its stored hash.
///
/// Returns the validation record to persist. `Err` only for the
/// integrity mismatch itself.
pub fn validate_soul(persona: &Persona, now: DateTime<Utc>) -> Result<SoulValidation, SoulError> {
    let actual = compute_integrity_hash(&persona.soul.content);
    if actual != persona.soul.integrity_hash {
        warn!(
            persona_id = %persona.id,
            expected = %persona.soul.integrity_hash,
            actual = %actual,
            "Soul integrity hash mismatch"
        );
        return Err(SoulError::IntegrityMismatch {
            persona_id: persona.id.clone(),
            expected: persona.soul.integrity_hash.clone(),
            actual,
        });
    }
    Ok(SoulValidation {
        persona_id: persona.id.clone(),
        valid: true,
        checked_at: now,
        detail: None,
    })
}

/// Derive voice markers from the soul's marker sections.
///
/// Unknown sections are ignored; a soul with no marker sections yields
/// empty markers and drift analysis simply has less to check.
pub fn extract_markers(content: &str) -> VoiceMarkers {
    let mut markers = VoiceMarkers::default();
    let mut current: Option<&mut Vec<String>> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("##") {
            let heading = trimmed.to_lowercase();
            current = if heading == VOCABULARY_HEADING {
                Some(&mut markers.vocabulary)
            } else if heading == FORBIDDEN_HEADING {
                Some(&mut markers.forbidden_phrases)
            } else if heading == PATTERNS_HEADING {
                Some(&mut markers.structural_patterns)
            } else {
                None
            };
            continue;
        }
        if let Some(target) = current.as_deref_mut() {
            if let Some(item) = trimmed.strip_prefix("- ") {
                let item = item.trim();
                if !item.is_empty() {
                    target.push(item.to_string());
                }
            }
        }
    }

    markers
}
