//! Extractor for EventBridge events delivered to an SNS topic target.

use crate::classify::parse_embedded_json;
use crate::context::SpanContext;
use crate::extractor::{EventTraceExtractor, ExtractionScope, RecordContext, extract_records};
use crate::extractors::event_bridge::event_bridge_context;
use crate::tracer::CheckpointKind;
use serde_json::Value;
use tracing::debug;

/// Extractor for EventBridge-to-SNS events.
#[derive(Clone, Copy, Debug, Default)]
pub struct EventBridgeSnsEventExtractor;

impl EventBridgeSnsEventExtractor {
    /// Creates a new EventBridge-to-SNS event extractor.
    pub fn new() -> Self {
        Self
    }
}

impl EventTraceExtractor for EventBridgeSnsEventExtractor {
    fn extract(&self, event: &Value, scope: &ExtractionScope<'_>) -> Vec<SpanContext> {
        extract_records(event, scope, CheckpointKind::Sns, |record| {
            let sns = record.get("Sns");
            let message = sns
                .and_then(|sns| sns.get("Message"))
                .and_then(parse_embedded_json);
            let (headers, context) = match message {
                Some(ref message) => event_bridge_context(message, scope),
                None => (None, None),
            };

            if let Some(ref context) = context {
                debug!(%context, "Extracted trace context from EventBridge-SNS event");
            }

            RecordContext {
                headers,
                context,
                resource: sns
                    .and_then(|sns| sns.get("TopicArn"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }
        })
    }
}
