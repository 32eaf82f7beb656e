//! Extractor for EventBridge events delivered to an SQS queue target.

use crate::classify::parse_embedded_json;
use crate::context::SpanContext;
use crate::extractor::{EventTraceExtractor, ExtractionScope, RecordContext, extract_records};
use crate::extractors::event_bridge::event_bridge_context;
use crate::extractors::sqs::{aws_trace_header_context, event_source_arn};
use crate::tracer::CheckpointKind;
use serde_json::Value;
use tracing::debug;

/// Extractor for EventBridge-to-SQS events.
///
/// The SQS body is the EventBridge event (or a Step Functions context) as
/// JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct EventBridgeSqsEventExtractor;

impl EventBridgeSqsEventExtractor {
    /// Creates a new EventBridge-to-SQS event extractor.
    pub fn new() -> Self {
        Self
    }
}

impl EventTraceExtractor for EventBridgeSqsEventExtractor {
    fn extract(&self, event: &Value, scope: &ExtractionScope<'_>) -> Vec<SpanContext> {
        extract_records(event, scope, CheckpointKind::Sqs, |record| {
            let body = record.get("body").and_then(parse_embedded_json);
            let (headers, context) = match body {
                Some(ref body) => event_bridge_context(body, scope),
                None => {
                    debug!("SQS body is not a JSON object");
                    (None, None)
                }
            };
            let context = context.or_else(|| aws_trace_header_context(record));

            if let Some(ref context) = context {
                debug!(%context, "Extracted trace context from EventBridge-SQS event");
            }

            RecordContext {
                headers,
                context,
                resource: event_source_arn(record),
            }
        })
    }
}
