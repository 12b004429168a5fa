//! Error types for the Counterforce domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Degradation policy: `StoreError` and `EmbeddingError` are always caught
//! at subsystem boundaries and converted into safe defaults; only
//! `SoulError::IntegrityMismatch` is allowed to fail closed, because it
//! signals tampering rather than unavailability.

use thiserror::Error;

/// The top-level error type for all Counterforce operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Embedding errors ---
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    // --- Soul / persona definition errors ---
    #[error("Soul error: {0}")]
    Soul(#[from] SoulError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures from the persistent store.
///
/// All of these degrade: stranger relationship, empty memories, skipped
/// optional context. None of them may abort context assembly.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Insert failed: {0}")]
    InsertFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Row not found: {entity} {id}")]
    NotFound { entity: String, id: String },
}

/// Failures from the embedding collaborator.
///
/// Always recoverable — retrieval falls back to keyword and then
/// importance ordering.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("Embedding service unavailable: {0}")]
    Unavailable(String),

    #[error("Embedding generation failed: {0}")]
    GenerationFailed(String),
}

/// Failures around the persona definition artifact.
#[derive(Debug, Clone, Error)]
pub enum SoulError {
    #[error("Soul not found for persona {0}")]
    NotFound(String),

    #[error("Soul integrity mismatch for persona {persona_id}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        persona_id: String,
        expected: String,
        actual: String,
    },

    #[error("Soul content unreadable: {0}")]
    Unreadable(String),
}

impl SoulError {
    /// Whether this error is the fail-closed integrity case.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, SoulError::IntegrityMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_displays_correctly() {
        let err = Error::Store(StoreError::Unavailable("connection refused".into()));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn integrity_mismatch_is_fail_closed() {
        let err = SoulError::IntegrityMismatch {
            persona_id: "p1".into(),
            expected: "abc".into(),
            actual: "def".into(),
        };
        assert!(err.is_integrity_failure());
        assert!(err.to_string().contains("p1"));

        let other = SoulError::NotFound("p1".into());
        assert!(!other.is_integrity_failure());
    }

    #[test]
    fn embedding_error_converts_to_top_level() {
        let err: Error = EmbeddingError::Unavailable("no endpoint".into()).into();
        assert!(err.to_string().contains("no endpoint"));
    }
}
