//! EventBridge event extractor.
//!
//! Instrumented producers put the propagation headers in
//! `detail._datadog`. Step Functions targets put their own context object in
//! the detail instead, in which case the deterministic Step Functions ids are
//! used.

use crate::context::{HeaderMap, SpanContext};
use crate::extractor::{EventTraceExtractor, ExtractionScope, extract_from_headers, normalize_headers};
use serde_json::Value;
use tracing::debug;

/// Extractor for EventBridge events.
#[derive(Clone, Copy, Debug, Default)]
pub struct EventBridgeEventExtractor;

impl EventBridgeEventExtractor {
    /// Creates a new EventBridge event extractor.
    pub fn new() -> Self {
        Self
    }
}

impl EventTraceExtractor for EventBridgeEventExtractor {
    fn extract(&self, event: &Value, scope: &ExtractionScope<'_>) -> Vec<SpanContext> {
        let (_, context) = event_bridge_context(event, scope);

        if let Some(ref context) = context {
            debug!(%context, "Extracted trace context from EventBridge event");
        }
        context.into_iter().collect()
    }
}

/// Resolves the context carried by an EventBridge envelope.
///
/// Also accepts a bare Step Functions context, directly or under
/// `_datadog`, which is what a Step Functions task publishing to SNS or SQS
/// sends. Returns the canonical `detail._datadog` headers alongside.
pub(crate) fn event_bridge_context(
    payload: &Value,
    scope: &ExtractionScope<'_>,
) -> (Option<HeaderMap>, Option<SpanContext>) {
    let detail = payload.get("detail");
    let datadog = detail.and_then(|detail| detail.get("_datadog"));

    let headers = datadog.and_then(normalize_headers);
    let context = datadog
        .and_then(|datadog| extract_from_headers(datadog, scope))
        .or_else(|| detail.and_then(|detail| scope.step_functions.span_context(detail)))
        .or_else(|| scope.step_functions.span_context(payload))
        .or_else(|| {
            payload
                .get("_datadog")
                .and_then(|datadog| scope.step_functions.span_context(datadog))
        });

    (headers, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::context::{SampleMode, TraceSource};
    use crate::extractor::test_support::with_scope;
    use crate::step_function::deterministic_hash;
    use crate::tracer::PropagatingTracer;
    use serde_json::json;

    fn extract(event: &Value) -> Vec<SpanContext> {
        with_scope(&ExtractionConfig::default(), &PropagatingTracer::new(), |scope| {
            EventBridgeEventExtractor::new().extract(event, scope)
        })
    }

    fn step_function_context() -> Value {
        json!({
            "Execution": {
                "Id": "arn:aws:states:sa-east-1:425362996713:execution:abhinav-activity-state-machine:72a7ca3e-901c-41bb-b5a3-5f279b92a316",
                "Name": "72a7ca3e-901c-41bb-b5a3-5f279b92a316",
                "RoleArn": "arn:aws:iam::425362996713:role/service-role/StepFunctions-abhinav-activity-state-machine-role-22jpbgl6j",
                "StartTime": "2024-12-04T19:38:04.069Z"
            },
            "State": {
                "Name": "Lambda Invoke",
                "EnteredTime": "2024-12-04T19:38:04.118Z",
                "RetryCount": 0
            },
            "StateMachine": {
                "Id": "arn:aws:states:sa-east-1:425362996713:stateMachine:abhinav-activity-state-machine",
                "Name": "abhinav-activity-state-machine"
            }
        })
    }

    #[test]
    fn test_detail_datadog_headers() {
        let event = json!({
            "version": "0",
            "id": "bd3c8258-8d30-007c-2562-64715b2d0ea8",
            "detail-type": "UserSignUp",
            "source": "my.event",
            "detail": {
                "hello": "there",
                "_datadog": {
                    "x-datadog-trace-id": "5827606813695714842",
                    "x-datadog-parent-id": "4726693487091824375",
                    "x-datadog-sampled": "1",
                    "x-datadog-sampling-priority": "1"
                }
            }
        });

        let contexts = extract(&event);

        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].trace_id(), "5827606813695714842");
        assert_eq!(contexts[0].span_id(), "4726693487091824375");
        assert_eq!(contexts[0].sample_mode(), SampleMode::AutoKeep);
        assert_eq!(contexts[0].source(), TraceSource::Event);
    }

    #[test]
    fn test_step_function_context_in_detail() {
        let event = json!({
            "detail-type": "Step Functions Execution",
            "detail": step_function_context()
        });

        let contexts = extract(&event);

        assert_eq!(contexts.len(), 1);
        assert_eq!(
            contexts[0].trace_id(),
            deterministic_hash(
                "arn:aws:states:sa-east-1:425362996713:execution:abhinav-activity-state-machine:72a7ca3e-901c-41bb-b5a3-5f279b92a316"
            )
        );
        assert_eq!(contexts[0].sample_mode(), SampleMode::AutoKeep);
    }

    #[test]
    fn test_step_function_context_in_detail_datadog() {
        let event = json!({
            "detail-type": "Step Functions Execution",
            "detail": {"_datadog": step_function_context()}
        });

        assert_eq!(extract(&event).len(), 1);
    }

    #[test]
    fn test_detail_without_context() {
        let event = json!({"detail-type": "UserSignUp", "detail": {"hello": "there"}});
        assert!(extract(&event).is_empty());
    }
}
