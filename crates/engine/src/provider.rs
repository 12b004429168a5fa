//! The optional-context-provider contract.
//!
//! Every sub-context the orchestrator pulls in goes through one wrapper:
//! the provider either yields usable text or `None`; any internal error
//! is caught, written to the diagnostic sink, and converted to `None` —
//! never thrown, never blocking sibling providers.

use std::future::Future;
use std::sync::Arc;

use tracing::warn;

use counterforce_core::error::Error;
use counterforce_telemetry::{DegradationTag, DiagnosticSink};

/// Run one optional provider under the fetch-or-null contract.
pub(crate) async fn fetch_or_null<F, Fut>(
    name: &str,
    sink: &Arc<dyn DiagnosticSink>,
    fetch: F,
) -> Option<String>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<String>, Error>>,
{
    match fetch().await {
        Ok(Some(text)) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(e) => {
            warn!(provider = name, error = %e, "Optional context provider failed");
            sink.report(name, DegradationTag::ProviderFailed, Some(e.to_string()));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use counterforce_core::error::StoreError;
    use counterforce_telemetry::MemorySink;

    #[tokio::test]
    async fn ok_some_passes_through() {
        let sink: Arc<dyn DiagnosticSink> = Arc::new(MemorySink::new());
        let result = fetch_or_null("test", &sink, || async { Ok(Some("context".into())) }).await;
        assert_eq!(result.as_deref(), Some("context"));
    }

    #[tokio::test]
    async fn ok_none_and_blank_become_null() {
        let sink: Arc<dyn DiagnosticSink> = Arc::new(MemorySink::new());
        assert!(fetch_or_null("test", &sink, || async { Ok(None) }).await.is_none());
        assert!(
            fetch_or_null("test", &sink, || async { Ok(Some("   ".into())) })
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn errors_are_caught_and_reported() {
        let memory_sink = Arc::new(MemorySink::new());
        let sink: Arc<dyn DiagnosticSink> = memory_sink.clone();
        let result = fetch_or_null("memories", &sink, || async {
            Err(Error::Store(StoreError::Unavailable("down".into())))
        })
        .await;
        assert!(result.is_none());

        let events = memory_sink.events_by_tag(&DegradationTag::ProviderFailed);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subsystem, "memories");
    }
}
