//! Trait definition for trace context extraction from Lambda events.

use crate::config::ExtractionConfig;
use crate::context::{HeaderMap, SpanContext};
use crate::error::ExtractError;
use crate::step_function::StepFunctionContextCache;
use crate::tracer::{CheckpointKind, HostTracer};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use tracing::debug;

/// Everything an extractor may consult besides the event itself.
///
/// Built once per invocation by the pipeline and passed by reference, so
/// extractors never hold invocation state of their own.
#[derive(Clone, Copy)]
pub struct ExtractionScope<'a> {
    /// Extraction options.
    pub config: &'a ExtractionConfig,
    /// The tracer that parses header maps.
    pub tracer: &'a dyn HostTracer,
    /// Step Functions context memoised for this invocation.
    pub step_functions: &'a StepFunctionContextCache,
}

impl<'a> ExtractionScope<'a> {
    /// Creates a scope from its parts.
    pub fn new(
        config: &'a ExtractionConfig,
        tracer: &'a dyn HostTracer,
        step_functions: &'a StepFunctionContextCache,
    ) -> Self {
        Self {
            config,
            tracer,
            step_functions,
        }
    }

    /// Reports a consume checkpoint if data streams are enabled.
    pub fn checkpoint(&self, headers: Option<&HeaderMap>, kind: CheckpointKind, resource: &str) {
        if self.config.data_streams_enabled {
            self.tracer.set_consume_checkpoint(headers, kind, resource);
        }
    }
}

/// Extracts trace context from one event shape.
///
/// Implementations are stateless. A failure to find or parse a context is
/// not an error: the extractor returns an empty vector and the pipeline moves
/// on to the next source.
///
/// More than one context is returned only by sources that batch records,
/// and only when span links are enabled.
///
/// # Example
///
/// ```
/// use lambda_trace_context::extractor::{EventTraceExtractor, ExtractionScope};
/// use lambda_trace_context::SpanContext;
/// use serde_json::Value;
///
/// struct Nothing;
///
/// impl EventTraceExtractor for Nothing {
///     fn extract(&self, _event: &Value, _scope: &ExtractionScope<'_>) -> Vec<SpanContext> {
///         Vec::new()
///     }
/// }
/// ```
pub trait EventTraceExtractor: Send + Sync {
    /// Returns every context found in `event`, first one first.
    fn extract(&self, event: &Value, scope: &ExtractionScope<'_>) -> Vec<SpanContext>;
}

/// Result of looking at a single batch record.
#[derive(Debug, Default)]
pub(crate) struct RecordContext {
    /// Canonical header map found in the record, if any.
    pub headers: Option<HeaderMap>,
    /// Context resolved from the record, if any.
    pub context: Option<SpanContext>,
    /// ARN reported with the consume checkpoint.
    pub resource: String,
}

/// Walks a batch of records.
///
/// Only the first record is extracted unless span links are enabled. With
/// data streams enabled every record still reports a checkpoint.
pub(crate) fn extract_records<F>(
    event: &Value,
    scope: &ExtractionScope<'_>,
    kind: CheckpointKind,
    mut extract_record: F,
) -> Vec<SpanContext>
where
    F: FnMut(&Value) -> RecordContext,
{
    let Some(records) = event.get("Records").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut contexts = Vec::new();
    for (index, record) in records.iter().enumerate() {
        let wanted = index == 0 || scope.config.use_span_links;
        if !wanted && !scope.config.data_streams_enabled {
            break;
        }

        let found = extract_record(record);
        scope.checkpoint(found.headers.as_ref(), kind, &found.resource);

        if wanted && let Some(context) = found.context {
            contexts.push(context);
        }
    }

    contexts
}

/// Builds a canonical header map from a JSON object.
///
/// Keys are lower-cased. For list values only the first element is kept.
/// Numbers are rendered in decimal; any other value is dropped.
pub fn normalize_headers(value: &Value) -> Option<HeaderMap> {
    let object = value.as_object()?;

    let headers = object
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::Array(items) => items.first()?,
                other => other,
            };
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some((key.to_ascii_lowercase(), value))
        })
        .collect();

    Some(headers)
}

/// Resolves a context from a header-map carrying payload.
///
/// The host tracer is asked first. If it finds nothing, the same payload is
/// checked for a Step Functions context.
pub fn extract_from_headers(
    payload: &Value,
    scope: &ExtractionScope<'_>,
) -> Option<SpanContext> {
    if let Some(headers) = normalize_headers(payload)
        && let Some(context) = scope.tracer.extract(&headers)
    {
        return Some(context);
    }

    scope.step_functions.span_context(payload)
}

/// Decodes a standard base64 string holding a JSON document.
pub(crate) fn decode_base64_json(encoded: &str) -> Result<Value, ExtractError> {
    let bytes = STANDARD.decode(encoded.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Logs a parse failure and converts it to "no context".
pub(crate) fn log_failure<T>(source: &'static str, result: Result<T, ExtractError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            debug!(source, %error, "Unable to extract trace context");
            None
        }
    }
}
