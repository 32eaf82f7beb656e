//! Bridge to the tracer that runs inside the function.
//!
//! Header-format extraction, injection and span bookkeeping belong to the
//! host tracer. The engine only talks to it through [`HostTracer`], which is
//! resolved once at startup: either a real adapter such as
//! [`PropagatingTracer`] or the [`NoopTracer`] null object.

use crate::context::{
    HeaderMap, PARENT_ID_HEADER, SAMPLING_PRIORITY_HEADER, SampleMode, SpanContext,
    TRACE_ID_HEADER, TraceSource,
};
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::{
    SpanContext as OtelSpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use std::fmt;
use tracing::debug;

/// Event source reported with a consume checkpoint.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckpointKind {
    /// SQS queue record.
    Sqs,
    /// SNS topic record.
    Sns,
    /// Kinesis stream record.
    Kinesis,
}

impl CheckpointKind {
    /// Returns the lower-case source name.
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointKind::Sqs => "sqs",
            CheckpointKind::Sns => "sns",
            CheckpointKind::Kinesis => "kinesis",
        }
    }
}

impl fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations the engine needs from the host tracer.
pub trait HostTracer: Send + Sync {
    /// Extracts a span context from a canonical header map.
    fn extract(&self, headers: &HeaderMap) -> Option<SpanContext>;

    /// Produces outbound headers for a span context.
    fn inject(&self, context: &SpanContext) -> HeaderMap {
        context.to_headers()
    }

    /// Returns the context of the span currently active in the function.
    fn active_span_context(&self) -> Option<SpanContext> {
        None
    }

    /// Closes any scope left open by the previous invocation.
    fn close_scope(&self) {}

    /// Records that a message was consumed from `resource`.
    fn set_consume_checkpoint(
        &self,
        _headers: Option<&HeaderMap>,
        _kind: CheckpointKind,
        _resource: &str,
    ) {
    }
}

/// Tracer adapter used when no tracer is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl HostTracer for NoopTracer {
    fn extract(&self, _headers: &HeaderMap) -> Option<SpanContext> {
        None
    }
}

/// Tracer adapter that understands Datadog and W3C propagation headers.
///
/// Datadog `x-datadog-*` headers take precedence. A W3C `traceparent` is
/// accepted as a fallback, using the low 64 bits of its trace id. The active
/// span is read from the current OpenTelemetry context.
#[derive(Debug, Default)]
pub struct PropagatingTracer {
    w3c: TraceContextPropagator,
}

impl PropagatingTracer {
    /// Creates a new adapter.
    pub fn new() -> Self {
        Self::default()
    }

    fn extract_datadog(headers: &HeaderMap) -> Option<SpanContext> {
        let trace_id = parse_decimal_id(headers.get(TRACE_ID_HEADER)?)?;
        let parent_id = parse_decimal_id(headers.get(PARENT_ID_HEADER)?)?;
        if trace_id == 0 {
            return None;
        }

        let sample_mode = headers
            .get(SAMPLING_PRIORITY_HEADER)
            .and_then(|priority| priority.trim().parse::<i64>().ok())
            .and_then(|priority| SampleMode::try_from(priority).ok())
            .unwrap_or_default();

        Some(SpanContext::new(
            trace_id.to_string(),
            parent_id.to_string(),
            sample_mode,
            TraceSource::Event,
        ))
    }

    fn extract_w3c(&self, headers: &HeaderMap) -> Option<SpanContext> {
        let cx = self.w3c.extract(headers);
        let span = cx.span();
        from_otel_span_context(span.span_context(), TraceSource::Event)
    }
}

impl HostTracer for PropagatingTracer {
    fn extract(&self, headers: &HeaderMap) -> Option<SpanContext> {
        Self::extract_datadog(headers).or_else(|| self.extract_w3c(headers))
    }

    fn inject(&self, context: &SpanContext) -> HeaderMap {
        let mut headers = context.to_headers();

        if let Some(otel) = to_otel_span_context(context) {
            let cx = opentelemetry::Context::new().with_remote_span_context(otel);
            self.w3c.inject_context(&cx, &mut headers);
        }

        headers
    }

    fn active_span_context(&self) -> Option<SpanContext> {
        let cx = opentelemetry::Context::current();
        let span = cx.span();
        from_otel_span_context(span.span_context(), TraceSource::Tracer)
    }

    fn set_consume_checkpoint(
        &self,
        headers: Option<&HeaderMap>,
        kind: CheckpointKind,
        resource: &str,
    ) {
        debug!(
            %kind,
            resource,
            has_context = headers.is_some(),
            "Consume checkpoint"
        );
    }
}

fn parse_decimal_id(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

fn from_otel_span_context(otel: &OtelSpanContext, source: TraceSource) -> Option<SpanContext> {
    if !otel.is_valid() {
        return None;
    }

    let trace_bytes = otel.trace_id().to_bytes();
    let mut low = [0u8; 8];
    low.copy_from_slice(&trace_bytes[8..]);
    let trace_id = u64::from_be_bytes(low);
    if trace_id == 0 {
        return None;
    }
    let span_id = u64::from_be_bytes(otel.span_id().to_bytes());

    let sample_mode = if otel.is_sampled() {
        SampleMode::AutoKeep
    } else {
        SampleMode::AutoReject
    };

    Some(SpanContext::new(
        trace_id.to_string(),
        span_id.to_string(),
        sample_mode,
        source,
    ))
}

fn to_otel_span_context(context: &SpanContext) -> Option<OtelSpanContext> {
    let trace_id = parse_decimal_id(context.trace_id())?;
    let span_id = parse_decimal_id(context.span_id())?;

    let flags = if context.sample_mode().is_reject() {
        TraceFlags::default()
    } else {
        TraceFlags::SAMPLED
    };

    let otel = OtelSpanContext::new(
        TraceId::from_bytes(u128::from(trace_id).to_be_bytes()),
        SpanId::from_bytes(span_id.to_be_bytes()),
        flags,
        true,
        TraceState::default(),
    );

    otel.is_valid().then_some(otel)
}
