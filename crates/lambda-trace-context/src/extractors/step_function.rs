//! Step Functions event extractor.

use crate::context::SpanContext;
use crate::extractor::{EventTraceExtractor, ExtractionScope};
use serde_json::Value;
use tracing::debug;

/// Extractor for Lambda invocations made by a Step Functions task.
///
/// The payload is the execution context object; the ids are derived from it
/// deterministically so every state of one execution shares a trace.
#[derive(Clone, Copy, Debug, Default)]
pub struct StepFunctionEventExtractor;

impl StepFunctionEventExtractor {
    /// Creates a new Step Functions event extractor.
    pub fn new() -> Self {
        Self
    }
}

impl EventTraceExtractor for StepFunctionEventExtractor {
    fn extract(&self, event: &Value, scope: &ExtractionScope<'_>) -> Vec<SpanContext> {
        let context = scope.step_functions.span_context(event);

        if let Some(ref context) = context {
            debug!(%context, "Extracted trace context from Step Functions context");
        }
        context.into_iter().collect()
    }
}
