//! AppSync resolver event extractor.

use crate::context::SpanContext;
use crate::extractor::{EventTraceExtractor, ExtractionScope};
use crate::extractors::http::HttpEventExtractor;
use serde_json::{Value, json};

/// Extractor for AppSync resolver events.
///
/// AppSync forwards the client's HTTP headers under `request.headers`.
/// They are handled like an HTTP event, without authorizer decoding.
#[derive(Clone, Copy, Debug, Default)]
pub struct AppSyncEventExtractor;

impl AppSyncEventExtractor {
    /// Creates a new AppSync event extractor.
    pub fn new() -> Self {
        Self
    }
}

impl EventTraceExtractor for AppSyncEventExtractor {
    fn extract(&self, event: &Value, scope: &ExtractionScope<'_>) -> Vec<SpanContext> {
        let Some(headers) = event.get("request").and_then(|r| r.get("headers")) else {
            return Vec::new();
        };

        let request = json!({ "headers": headers });
        HttpEventExtractor::extract_with(&request, scope, false)
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::context::SampleMode;
    use crate::extractor::test_support::with_scope;
    use crate::tracer::PropagatingTracer;

    fn extract(event: &Value) -> Vec<SpanContext> {
        with_scope(
            &ExtractionConfig::default(),
            &PropagatingTracer::new(),
            |scope| AppSyncEventExtractor::new().extract(event, scope),
        )
    }

    #[test]
    fn test_request_headers() {
        let event = json!({
            "info": {"selectionSetGraphQL": "{ id }"},
            "request": {
                "headers": {
                    "X-Datadog-Trace-Id": "797643193680388254",
                    "x-datadog-parent-id": "4110911582297405557",
                    "x-datadog-sampling-priority": "2"
                }
            }
        });

        let contexts = extract(&event);

        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].trace_id(), "797643193680388254");
        assert_eq!(contexts[0].span_id(), "4110911582297405557");
        assert_eq!(contexts[0].sample_mode(), SampleMode::UserKeep);
    }

    #[test]
    fn test_missing_request_headers() {
        let event = json!({"info": {"selectionSetGraphQL": "{ id }"}, "request": {}});
        assert!(extract(&event).is_empty());
    }

    #[test]
    fn test_headers_without_trace_context() {
        let event = json!({"request": {"headers": {"host": "example.com"}}});
        assert!(extract(&event).is_empty());
    }
}
