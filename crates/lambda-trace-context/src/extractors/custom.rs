//! User-supplied trace extractor.
//!
//! Functions triggered by sources this crate does not understand can supply
//! their own extractor. It runs before every built-in source and is awaited
//! at most once per invocation, bounded by the configured timeout.

use crate::context::{CustomTraceContext, InvocationContext, SpanContext};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

/// A user-supplied trace extractor.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use lambda_trace_context::{CustomTraceContext, InvocationContext, SampleMode};
/// use lambda_trace_context::extractors::custom::CustomTraceExtractor;
/// use serde_json::Value;
///
/// struct FromBody;
///
/// #[async_trait]
/// impl CustomTraceExtractor for FromBody {
///     async fn extract(
///         &self,
///         event: &Value,
///         _context: &InvocationContext,
///     ) -> Result<CustomTraceContext, lambda_runtime::Error> {
///         let trace = event["trace"].as_str().ok_or("no trace")?;
///         let parent = event["parent"].as_str().ok_or("no parent")?;
///         Ok(CustomTraceContext::new(trace, parent, SampleMode::AutoKeep))
///     }
/// }
/// ```
#[async_trait]
pub trait CustomTraceExtractor: Send + Sync {
    /// Returns the trace context for `event`.
    async fn extract(
        &self,
        event: &Value,
        context: &InvocationContext,
    ) -> Result<CustomTraceContext, lambda_runtime::Error>;
}

/// Adapts a synchronous closure into a [`CustomTraceExtractor`].
///
/// ```
/// use lambda_trace_context::{CustomTraceContext, InvocationContext, SampleMode};
/// use lambda_trace_context::extractors::custom::FnTraceExtractor;
/// use serde_json::Value;
///
/// let extractor = FnTraceExtractor::new(|_event: &Value, _context: &InvocationContext| {
///     Ok(CustomTraceContext::new("1", "2", SampleMode::UserKeep))
/// });
/// ```
pub struct FnTraceExtractor<F> {
    f: F,
}

impl<F> FnTraceExtractor<F> {
    /// Wraps `f`.
    pub fn new(f: F) -> Self
    where
        F: Fn(&Value, &InvocationContext) -> Result<CustomTraceContext, lambda_runtime::Error>
            + Send
            + Sync,
    {
        Self { f }
    }
}

#[async_trait]
impl<F> CustomTraceExtractor for FnTraceExtractor<F>
where
    F: Fn(&Value, &InvocationContext) -> Result<CustomTraceContext, lambda_runtime::Error>
        + Send
        + Sync,
{
    async fn extract(
        &self,
        event: &Value,
        context: &InvocationContext,
    ) -> Result<CustomTraceContext, lambda_runtime::Error> {
        (self.f)(event, context)
    }
}

/// Runs `extractor` once, bounded by `timeout`.
///
/// Errors, timeouts and contexts without both ids all yield `None`.
pub async fn run_custom_extractor(
    extractor: &dyn CustomTraceExtractor,
    event: &Value,
    context: &InvocationContext,
    timeout: Duration,
) -> Option<SpanContext> {
    let trace_context = match tokio::time::timeout(timeout, extractor.extract(event, context)).await
    {
        Ok(Ok(trace_context)) => trace_context,
        Ok(Err(err)) => {
            error!(error = %err, "Unable to extract trace context. Custom extractor function failed");
            return None;
        }
        Err(_) => {
            error!(
                timeout_ms = timeout.as_millis() as u64,
                "Unable to extract trace context. Custom extractor function timed out"
            );
            return None;
        }
    };

    let span_context = SpanContext::from_trace_context(&trace_context)?;
    debug!(%span_context, "Extracted trace context from custom extractor");
    Some(span_context)
}
