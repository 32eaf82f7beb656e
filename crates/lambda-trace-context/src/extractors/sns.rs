//! SNS event extractor for notification triggers.
//!
//! The `_datadog` message attribute carries the propagation headers either
//! as a JSON string (`Type: "String"`) or as base64-encoded JSON
//! (`Type: "Binary"`, used when raw message delivery is off).

use crate::context::SpanContext;
use crate::error::ExtractError;
use crate::extractor::{
    EventTraceExtractor, ExtractionScope, RecordContext, decode_base64_json, extract_from_headers,
    extract_records, log_failure, normalize_headers,
};
use crate::tracer::CheckpointKind;
use serde_json::Value;
use tracing::debug;

/// Extractor for SNS notification events.
#[derive(Clone, Copy, Debug, Default)]
pub struct SnsEventExtractor;

impl SnsEventExtractor {
    /// Creates a new SNS event extractor.
    pub fn new() -> Self {
        Self
    }
}

impl EventTraceExtractor for SnsEventExtractor {
    fn extract(&self, event: &Value, scope: &ExtractionScope<'_>) -> Vec<SpanContext> {
        extract_records(event, scope, CheckpointKind::Sns, |record| {
            let sns = record.get("Sns");
            let payload = sns
                .and_then(|sns| sns.get("MessageAttributes"))
                .and_then(|attributes| attributes.get("_datadog"))
                .and_then(|attribute| log_failure("sns", decode_sns_attribute(attribute)));

            let headers = payload.as_ref().and_then(normalize_headers);
            let context = payload
                .as_ref()
                .and_then(|payload| extract_from_headers(payload, scope));

            if let Some(ref context) = context {
                debug!(%context, "Extracted trace context from SNS event");
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

/// Decodes an SNS `_datadog` message attribute.
///
/// SNS records spell the fields `Type`/`Value`; the same attribute inside
/// an SNS notification delivered through SQS uses the same spelling.
pub(crate) fn decode_sns_attribute(attribute: &Value) -> Result<Value, ExtractError> {
    let value = attribute
        .get("Value")
        .and_then(Value::as_str)
        .ok_or(ExtractError::MissingField("_datadog.Value"))?;

    match attribute.get("Type").and_then(Value::as_str) {
        Some("String") => Ok(serde_json::from_str(value)?),
        _ => decode_base64_json(value),
    }
}
