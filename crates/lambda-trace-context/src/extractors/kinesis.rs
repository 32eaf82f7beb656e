//! Kinesis stream event extractor.
//!
//! Kinesis records have no attributes, so instrumented producers wrap the
//! payload as a JSON object with a `_datadog` field. The record's `data` is
//! that object, base64 encoded.

use crate::context::SpanContext;
use crate::error::ExtractError;
use crate::extractor::{
    EventTraceExtractor, ExtractionScope, RecordContext, decode_base64_json, extract_from_headers,
    extract_records, log_failure, normalize_headers,
};
use crate::tracer::CheckpointKind;
use serde_json::Value;
use tracing::debug;

/// Extractor for Kinesis stream events.
#[derive(Clone, Copy, Debug, Default)]
pub struct KinesisEventExtractor;

impl KinesisEventExtractor {
    /// Creates a new Kinesis event extractor.
    pub fn new() -> Self {
        Self
    }
}

impl EventTraceExtractor for KinesisEventExtractor {
    fn extract(&self, event: &Value, scope: &ExtractionScope<'_>) -> Vec<SpanContext> {
        extract_records(event, scope, CheckpointKind::Kinesis, |record| {
            let payload = log_failure("kinesis", datadog_field(record)).flatten();
            let headers = payload.as_ref().and_then(normalize_headers);
            let context = payload
                .as_ref()
                .and_then(|payload| extract_from_headers(payload, scope));

            if let Some(ref context) = context {
                debug!(%context, "Extracted trace context from Kinesis event");
            }

            RecordContext {
                headers,
                context,
                resource: record
                    .get("eventSourceARN")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }
        })
    }
}

fn datadog_field(record: &Value) -> Result<Option<Value>, ExtractError> {
    let data = record
        .get("kinesis")
        .and_then(|kinesis| kinesis.get("data"))
        .and_then(Value::as_str)
        .ok_or(ExtractError::MissingField("kinesis.data"))?;

    let mut body = decode_base64_json(data)?;
    Ok(body.get_mut("_datadog").map(Value::take))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::context::{SampleMode, TraceSource};
    use crate::extractor::test_support::{RecordingTracer, encode_json, with_scope};
    use crate::tracer::PropagatingTracer;
    use serde_json::json;

    const STREAM_ARN: &str = "arn:aws:kinesis:sa-east-1:425362996713:stream/kinesisStream";

    fn record(data: &str) -> Value {
        json!({
            "kinesis": {
                "kinesisSchemaVersion": "1.0",
                "partitionKey": "partitionkey",
                "sequenceNumber": "49624230154685806402418173680709770494154422022871973890",
                "data": data,
                "approximateArrivalTimestamp": 1642518727.248
            },
            "eventSource": "aws:kinesis",
            "eventID": "shardId-000000000000:49545115243490985018280067714973144582180062593244200961",
            "eventName": "aws:kinesis:record",
            "awsRegion": "sa-east-1",
            "eventSourceARN": STREAM_ARN
        })
    }

    fn datadog_data(trace_id: &str) -> String {
        encode_json(&json!({
            "data": "hello",
            "_datadog": {
                "x-datadog-trace-id": trace_id,
                "x-datadog-parent-id": "1350735035497811828",
                "x-datadog-sampling-priority": "2"
            }
        }))
    }

    fn extract(event: &Value, config: &ExtractionConfig) -> Vec<SpanContext> {
        with_scope(config, &PropagatingTracer::new(), |scope| {
            KinesisEventExtractor::new().extract(event, scope)
        })
    }

    #[test]
    fn test_datadog_field() {
        let event = json!({"Records": [record(&datadog_data("667309514221035538"))]});

        let contexts = extract(&event, &ExtractionConfig::default());

        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].trace_id(), "667309514221035538");
        assert_eq!(contexts[0].span_id(), "1350735035497811828");
        assert_eq!(contexts[0].sample_mode(), SampleMode::UserKeep);
        assert_eq!(contexts[0].source(), TraceSource::Event);
    }

    #[test]
    fn test_data_without_datadog_field() {
        let event = json!({"Records": [record(&encode_json(&json!({"data": "hello"})))]});
        assert!(extract(&event, &ExtractionConfig::default()).is_empty());
    }

    #[test]
    fn test_data_not_base64_json() {
        let event = json!({"Records": [record("aGVsbG8=")]});
        assert!(extract(&event, &ExtractionConfig::default()).is_empty());
    }

    #[test]
    fn test_span_links_and_checkpoints() {
        let event = json!({"Records": [
            record(&datadog_data("1")),
            record(&datadog_data("2")),
        ]});
        let config = ExtractionConfig::builder()
            .use_span_links(true)
            .data_streams_enabled(true)
            .build();
        let tracer = RecordingTracer::default();

        let contexts = with_scope(&config, &tracer, |scope| {
            KinesisEventExtractor::new().extract(&event, scope)
        });

        let ids: Vec<&str> = contexts.iter().map(SpanContext::trace_id).collect();
        assert_eq!(ids, ["1", "2"]);

        let checkpoints = tracer.checkpoints.lock().unwrap();
        assert_eq!(checkpoints.len(), 2);
        assert!(checkpoints.iter().all(|(headers, kind, arn)| {
            headers.is_some() && *kind == CheckpointKind::Kinesis && arn == STREAM_ARN
        }));
    }
}
