//! Extractor for SNS notifications delivered through an SQS subscription.
//!
//! Without raw message delivery the SQS body is the whole SNS notification
//! as JSON, so the `_datadog` attribute sits in the body's
//! `MessageAttributes` rather than on the SQS record.

use crate::classify::parse_embedded_json;
use crate::context::SpanContext;
use crate::error::ExtractError;
use crate::extractor::{
    EventTraceExtractor, ExtractionScope, RecordContext, extract_from_headers, extract_records,
    log_failure, normalize_headers,
};
use crate::extractors::sns::decode_sns_attribute;
use crate::extractors::sqs::{aws_trace_header_context, event_source_arn};
use crate::tracer::CheckpointKind;
use serde_json::Value;
use tracing::debug;

/// Extractor for SNS-to-SQS events.
#[derive(Clone, Copy, Debug, Default)]
pub struct SnsSqsEventExtractor;

impl SnsSqsEventExtractor {
    /// Creates a new SNS-to-SQS event extractor.
    pub fn new() -> Self {
        Self
    }
}

impl EventTraceExtractor for SnsSqsEventExtractor {
    fn extract(&self, event: &Value, scope: &ExtractionScope<'_>) -> Vec<SpanContext> {
        extract_records(event, scope, CheckpointKind::Sqs, |record| {
            let payload = log_failure("sns-sqs", notification_attribute(record)).flatten();
            let headers = payload.as_ref().and_then(normalize_headers);
            let context = payload
                .as_ref()
                .and_then(|payload| extract_from_headers(payload, scope))
                .or_else(|| aws_trace_header_context(record));

            if let Some(ref context) = context {
                debug!(%context, "Extracted trace context from SNS-SQS event");
            }

            RecordContext {
                headers,
                context,
                resource: event_source_arn(record),
            }
        })
    }
}

fn notification_attribute(record: &Value) -> Result<Option<Value>, ExtractError> {
    let body = record
        .get("body")
        .ok_or(ExtractError::MissingField("body"))?;
    let notification = parse_embedded_json(body).ok_or(ExtractError::InvalidField("body"))?;

    notification
        .get("MessageAttributes")
        .and_then(|attributes| attributes.get("_datadog"))
        .map(decode_sns_attribute)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::context::{SampleMode, TraceSource};
    use crate::extractor::test_support::{RecordingTracer, encode_json, with_scope};
    use crate::tracer::PropagatingTracer;
    use serde_json::json;

    const QUEUE_ARN: &str = "arn:aws:sqs:sa-east-1:425362996713:my-queue";

    fn headers() -> Value {
        json!({
            "x-datadog-trace-id": "2776434475358637757",
            "x-datadog-parent-id": "4493917105238181843",
            "x-datadog-sampling-priority": "1"
        })
    }

    fn record(attribute: Value) -> Value {
        let body = json!({
            "Type": "Notification",
            "MessageId": "43ff4e3c-c42e-5a4d-8a8f-c9ec4f5d1d22",
            "TopicArn": "arn:aws:sns:sa-east-1:425362996713:my-topic",
            "Message": "hello",
            "MessageAttributes": {"_datadog": attribute}
        });

        json!({
            "messageId": "1",
            "body": body.to_string(),
            "attributes": {},
            "messageAttributes": {},
            "eventSource": "aws:sqs",
            "eventSourceARN": QUEUE_ARN
        })
    }

    fn extract(event: &Value) -> Vec<SpanContext> {
        with_scope(&ExtractionConfig::default(), &PropagatingTracer::new(), |scope| {
            SnsSqsEventExtractor::new().extract(event, scope)
        })
    }

    #[test]
    fn test_binary_attribute_in_body() {
        let event = json!({"Records": [record(json!({
            "Type": "Binary",
            "Value": encode_json(&headers())
        }))]});

        let contexts = extract(&event);

        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].trace_id(), "2776434475358637757");
        assert_eq!(contexts[0].span_id(), "4493917105238181843");
        assert_eq!(contexts[0].sample_mode(), SampleMode::AutoKeep);
        assert_eq!(contexts[0].source(), TraceSource::Event);
    }

    #[test]
    fn test_string_attribute_in_body() {
        let event = json!({"Records": [record(json!({
            "Type": "String",
            "Value": headers().to_string()
        }))]});

        assert_eq!(extract(&event)[0].trace_id(), "2776434475358637757");
    }

    #[test]
    fn test_body_without_attribute() {
        let mut record = record(json!({}));
        record["body"] = json!(json!({"Type": "Notification", "TopicArn": "arn"}).to_string());
        let event = json!({"Records": [record]});

        assert!(extract(&event).is_empty());
    }

    #[test]
    fn test_checkpoint_uses_queue_arn() {
        let event = json!({"Records": [record(json!({
            "Type": "String",
            "Value": headers().to_string()
        }))]});
        let config = ExtractionConfig::builder().data_streams_enabled(true).build();
        let tracer = RecordingTracer::default();

        with_scope(&config, &tracer, |scope| {
            SnsSqsEventExtractor::new().extract(&event, scope)
        });

        let checkpoints = tracer.checkpoints.lock().unwrap();
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(checkpoints[0].1, CheckpointKind::Sqs);
        assert_eq!(checkpoints[0].2, QUEUE_ARN);
    }
}
