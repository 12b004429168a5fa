//! Diagnostic sink — structured degraded-path reporting.
//!
//! Every subsystem that catches an error and degrades writes an event
//! here. The sink is append-only and write-only: nothing recorded here is
//! ever read back into persona-visible context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single diagnostic event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub timestamp: DateTime<Utc>,

    /// Which subsystem degraded (`memory`, `relationship`, `entropy`, …).
    pub subsystem: String,

    pub tag: DegradationTag,

    /// Human-readable detail, usually the caught error's display form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Why a path degraded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DegradationTag {
    /// Store call failed; safe default substituted.
    StorageUnavailable,
    /// Embedding call failed; keyword/importance fallback used.
    EmbeddingFailed,
    /// Soul hash mismatch; assembly failed closed.
    IntegrityFailure,
    /// Extraction candidate below the confidence gate; skipped, not an error.
    ExtractionLowConfidence,
    /// Every sub-fetch failed; minimal fallback context emitted.
    CatastrophicFallback,
    /// An optional context provider errored and was nulled.
    ProviderFailed,
    /// A fire-and-forget completion touch failed and was swallowed.
    CompletionTouchFailed,
}

impl DegradationTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradationTag::StorageUnavailable => "storage_unavailable",
            DegradationTag::EmbeddingFailed => "embedding_failed",
            DegradationTag::IntegrityFailure => "integrity_failure",
            DegradationTag::ExtractionLowConfidence => "extraction_low_confidence",
            DegradationTag::CatastrophicFallback => "catastrophic_fallback",
            DegradationTag::ProviderFailed => "provider_failed",
            DegradationTag::CompletionTouchFailed => "completion_touch_failed",
        }
    }
}

/// Trait for diagnostic sinks (where events are written).
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, event: DiagnosticEvent);

    /// Convenience: build and record an event stamped now.
    fn report(&self, subsystem: &str, tag: DegradationTag, detail: Option<String>) {
        self.record(DiagnosticEvent {
            timestamp: Utc::now(),
            subsystem: subsystem.into(),
            tag,
            detail,
        });
    }
}

/// In-memory sink that stores events in a vector. Useful for tests and
/// small deployments.
#[derive(Default)]
pub struct MemorySink {
    events: std::sync::Mutex<Vec<DiagnosticEvent>>,
}

impl std::fmt::Debug for MemorySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.events.lock().unwrap().len();
        f.debug_struct("MemorySink").field("event_count", &count).finish()
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_by_tag(&self, tag: &DegradationTag) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| &e.tag == tag)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, event: DiagnosticEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// A tracing-based sink that logs events via `tracing::warn!`.
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, event: DiagnosticEvent) {
        tracing::warn!(
            subsystem = %event.subsystem,
            tag = event.tag.as_str(),
            detail = ?event.detail,
            "DEGRADED"
        );
    }
}

/// A sink that discards everything. For callers that opt out of
/// diagnostics entirely.
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn record(&self, _event: DiagnosticEvent) {}
}

/// Install the global tracing subscriber, filtered by `RUST_LOG`.
///
/// Call once from the composition root. Safe to call again; later calls
/// are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("counterforce=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_and_retrieve_events() {
        let sink = MemorySink::new();
        sink.report("memory", DegradationTag::EmbeddingFailed, Some("no endpoint".into()));
        sink.report("relationship", DegradationTag::StorageUnavailable, None);

        assert_eq!(sink.count(), 2);
        let events = sink.events();
        assert_eq!(events[0].subsystem, "memory");
        assert_eq!(events[1].tag, DegradationTag::StorageUnavailable);
    }

    #[test]
    fn filter_by_tag() {
        let sink = MemorySink::new();
        sink.report("a", DegradationTag::ProviderFailed, None);
        sink.report("b", DegradationTag::ProviderFailed, None);
        sink.report("c", DegradationTag::IntegrityFailure, None);

        assert_eq!(sink.events_by_tag(&DegradationTag::ProviderFailed).len(), 2);
        assert_eq!(sink.events_by_tag(&DegradationTag::IntegrityFailure).len(), 1);
        assert_eq!(sink.events_by_tag(&DegradationTag::EmbeddingFailed).len(), 0);
    }

    #[test]
    fn null_sink_swallows_everything() {
        let sink = NullSink;
        sink.report("anything", DegradationTag::CatastrophicFallback, None);
    }

    #[test]
    fn event_serialization() {
        let event = DiagnosticEvent {
            timestamp: Utc::now(),
            subsystem: "memory".into(),
            tag: DegradationTag::ExtractionLowConfidence,
            detail: Some("importance 0.12 below gate".into()),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("extraction_low_confidence"));
        let back: DiagnosticEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tag, DegradationTag::ExtractionLowConfidence);
    }
}
