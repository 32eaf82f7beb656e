//! Extractor for the client context of a direct Lambda invocation.
//!
//! A caller using the AWS SDK `Invoke` API can pass a client context whose
//! `custom` map carries the propagation headers, either nested under
//! `_datadog` or at the top level of `custom`.

use crate::context::{
    InvocationContext, PARENT_ID_HEADER, SAMPLING_PRIORITY_HEADER, SpanContext, TRACE_ID_HEADER,
};
use crate::extractor::{ExtractionScope, normalize_headers};
use serde_json::Value;
use tracing::debug;

const REQUIRED_HEADERS: [&str; 3] = [TRACE_ID_HEADER, PARENT_ID_HEADER, SAMPLING_PRIORITY_HEADER];

/// Extractor for the invocation's client context.
#[derive(Clone, Copy, Debug, Default)]
pub struct LambdaContextExtractor;

impl LambdaContextExtractor {
    /// Creates a new client context extractor.
    pub fn new() -> Self {
        Self
    }

    /// Extracts from the client context `custom` map.
    ///
    /// All three propagation headers must be present.
    pub fn extract(
        &self,
        context: &InvocationContext,
        scope: &ExtractionScope<'_>,
    ) -> Option<SpanContext> {
        let custom = context.client_custom.as_ref()?;

        let trace_data = match custom.get("_datadog") {
            Some(nested) if has_required_headers(nested) => nested,
            _ if has_required_headers(custom) => custom,
            _ => return None,
        };

        let headers = normalize_headers(trace_data)?;
        let span_context = scope.tracer.extract(&headers)?;
        debug!(%span_context, "Extracted trace context from Lambda client context");
        Some(span_context)
    }
}

fn has_required_headers(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|object| REQUIRED_HEADERS.iter().all(|h| object.contains_key(*h)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::context::{SampleMode, TraceSource};
    use crate::extractor::test_support::with_scope;
    use crate::tracer::PropagatingTracer;
    use serde_json::json;

    fn extract(custom: Value) -> Option<SpanContext> {
        let context = InvocationContext::new("req-1").with_client_custom(custom);
        with_scope(&ExtractionConfig::default(), &PropagatingTracer::new(), |scope| {
            LambdaContextExtractor::new().extract(&context, scope)
        })
    }

    #[test]
    fn test_nested_datadog_headers() {
        let ctx = extract(json!({
            "_datadog": {
                "x-datadog-trace-id": "667309514221035538",
                "x-datadog-parent-id": "1350735035497811828",
                "x-datadog-sampling-priority": "1"
            }
        }))
        .unwrap();

        assert_eq!(ctx.trace_id(), "667309514221035538");
        assert_eq!(ctx.span_id(), "1350735035497811828");
        assert_eq!(ctx.sample_mode(), SampleMode::AutoKeep);
        assert_eq!(ctx.source(), TraceSource::Event);
    }

    #[test]
    fn test_flat_headers() {
        let ctx = extract(json!({
            "x-datadog-trace-id": "667309514221035538",
            "x-datadog-parent-id": "1350735035497811828",
            "x-datadog-sampling-priority": "2"
        }))
        .unwrap();

        assert_eq!(ctx.sample_mode(), SampleMode::UserKeep);
    }

    #[test]
    fn test_incomplete_headers() {
        assert!(
            extract(json!({
                "_datadog": {
                    "x-datadog-trace-id": "667309514221035538",
                    "x-datadog-parent-id": "1350735035497811828"
                }
            }))
            .is_none()
        );
        assert!(
            extract(json!({
                "x-datadog-trace-id": "667309514221035538",
                "x-datadog-sampling-priority": "1"
            }))
            .is_none()
        );
    }

    #[test]
    fn test_no_client_context() {
        let context = InvocationContext::new("req-1");
        let result = with_scope(&ExtractionConfig::default(), &PropagatingTracer::new(), |scope| {
            LambdaContextExtractor::new().extract(&context, scope)
        });

        assert!(result.is_none());
        assert!(extract(json!("not an object")).is_none());
    }
}
