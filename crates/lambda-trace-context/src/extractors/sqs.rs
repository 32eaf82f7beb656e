//! SQS event extractor for message queue triggers.
//!
//! Producers instrumented by Datadog inject a `_datadog` message attribute
//! holding the propagation headers as JSON. When it is absent, the X-Ray
//! `AWSTraceHeader` system attribute set by an upstream producer is used.

use crate::context::{SpanContext, TraceSource};
use crate::error::ExtractError;
use crate::extractor::{
    EventTraceExtractor, ExtractionScope, RecordContext, decode_base64_json, extract_from_headers,
    extract_records, log_failure, normalize_headers,
};
use crate::tracer::CheckpointKind;
use crate::xray::XrayTraceHeader;
use serde_json::Value;
use tracing::debug;

/// Extractor for SQS message events.
#[derive(Clone, Copy, Debug, Default)]
pub struct SqsEventExtractor;

impl SqsEventExtractor {
    /// Creates a new SQS event extractor.
    pub fn new() -> Self {
        Self
    }
}

impl EventTraceExtractor for SqsEventExtractor {
    fn extract(&self, event: &Value, scope: &ExtractionScope<'_>) -> Vec<SpanContext> {
        extract_records(event, scope, CheckpointKind::Sqs, |record| {
            let payload = log_failure("sqs", datadog_attribute(record)).flatten();
            let headers = payload.as_ref().and_then(normalize_headers);
            let context = payload
                .as_ref()
                .and_then(|payload| extract_from_headers(payload, scope))
                .or_else(|| aws_trace_header_context(record));

            if let Some(ref context) = context {
                debug!(%context, "Extracted trace context from SQS event");
            }

            RecordContext {
                headers,
                context,
                resource: event_source_arn(record),
            }
        })
    }
}

/// Reads the `_datadog` message attribute of an SQS record.
///
/// `Ok(None)` when the attribute is absent.
fn datadog_attribute(record: &Value) -> Result<Option<Value>, ExtractError> {
    let Some(attribute) = record
        .get("messageAttributes")
        .and_then(|attributes| attributes.get("_datadog"))
    else {
        return Ok(None);
    };

    if let Some(json) = attribute.get("stringValue").and_then(Value::as_str) {
        return Ok(Some(serde_json::from_str(json)?));
    }

    if let Some(encoded) = attribute.get("binaryValue").and_then(Value::as_str) {
        return Ok(Some(decode_base64_json(encoded)?));
    }

    Err(ExtractError::MissingField("messageAttributes._datadog.stringValue"))
}

/// Converts the record's `AWSTraceHeader` system attribute, if present.
pub(crate) fn aws_trace_header_context(record: &Value) -> Option<SpanContext> {
    let header = record
        .get("attributes")?
        .get("AWSTraceHeader")?
        .as_str()?;

    let context = XrayTraceHeader::parse(header)?.to_span_context();
    match context {
        Some(context) => {
            debug!(%context, "Extracted trace context from SQS AWSTraceHeader");
            Some(context.with_source(TraceSource::Event))
        }
        None => {
            debug!(header, "No trace context found in SQS AWSTraceHeader");
            None
        }
    }
}

/// Returns the queue ARN of an SQS record.
pub(crate) fn event_source_arn(record: &Value) -> String {
    record
        .get("eventSourceARN")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
