//! Trace identity types shared by every extractor.

use lambda_runtime::Context as LambdaContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Outbound header carrying the decimal trace id.
pub const TRACE_ID_HEADER: &str = "x-datadog-trace-id";
/// Outbound header carrying the decimal parent (span) id.
pub const PARENT_ID_HEADER: &str = "x-datadog-parent-id";
/// Outbound header carrying the sampling priority.
pub const SAMPLING_PRIORITY_HEADER: &str = "x-datadog-sampling-priority";

/// Canonical header map: lower-case keys, single values.
pub type HeaderMap = HashMap<String, String>;

/// Keep/reject decision and its authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum SampleMode {
    /// Rejected by a user rule.
    UserReject,
    /// Rejected by the sampler.
    AutoReject,
    /// Kept by the sampler.
    #[default]
    AutoKeep,
    /// Kept by a user rule.
    UserKeep,
}

impl SampleMode {
    /// Returns the numeric sampling priority.
    pub fn priority(self) -> i64 {
        match self {
            SampleMode::UserReject => -1,
            SampleMode::AutoReject => 0,
            SampleMode::AutoKeep => 1,
            SampleMode::UserKeep => 2,
        }
    }

    /// Returns `true` for either reject mode.
    pub fn is_reject(self) -> bool {
        matches!(self, SampleMode::UserReject | SampleMode::AutoReject)
    }
}

impl TryFrom<i64> for SampleMode {
    type Error = String;

    fn try_from(priority: i64) -> Result<Self, Self::Error> {
        match priority {
            -1 => Ok(SampleMode::UserReject),
            0 => Ok(SampleMode::AutoReject),
            1 => Ok(SampleMode::AutoKeep),
            2 => Ok(SampleMode::UserKeep),
            other => Err(format!("unknown sampling priority {other}")),
        }
    }
}

impl From<SampleMode> for i64 {
    fn from(mode: SampleMode) -> Self {
        mode.priority()
    }
}

impl fmt::Display for SampleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.priority())
    }
}

/// Where a trace identity came from.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceSource {
    /// The invocation payload or client context.
    #[default]
    Event,
    /// The ambient X-Ray trace header.
    Xray,
    /// The host tracer's active span.
    #[serde(rename = "ddtrace")]
    Tracer,
}

/// A resolved trace identity.
///
/// Ids are decimal strings. Once built a context is never mutated; use
/// [`SpanContext::with_source`] to re-tag a copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpanContext {
    trace_id: String,
    span_id: String,
    sample_mode: SampleMode,
    source: TraceSource,
}

impl SpanContext {
    /// Creates a span context from decimal ids.
    pub fn new(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        sample_mode: SampleMode,
        source: TraceSource,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            sample_mode,
            source,
        }
    }

    /// The decimal trace id.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// The decimal span id, used as the parent id of the next span.
    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    /// The sampling decision.
    pub fn sample_mode(&self) -> SampleMode {
        self.sample_mode
    }

    /// Where this context came from.
    pub fn source(&self) -> TraceSource {
        self.source
    }

    /// Returns a copy tagged with a different source.
    pub fn with_source(mut self, source: TraceSource) -> Self {
        self.source = source;
        self
    }

    /// Returns the canonical outbound headers for this context.
    pub fn to_headers(&self) -> HeaderMap {
        HeaderMap::from([
            (TRACE_ID_HEADER.to_string(), self.trace_id.clone()),
            (PARENT_ID_HEADER.to_string(), self.span_id.clone()),
            (
                SAMPLING_PRIORITY_HEADER.to_string(),
                self.sample_mode.to_string(),
            ),
        ])
    }

    /// Builds a span context from a user-supplied trace context.
    ///
    /// Returns `None` when either id is missing.
    pub fn from_trace_context(context: &CustomTraceContext) -> Option<Self> {
        let trace_id = context.trace_id.as_deref()?;
        let parent_id = context.parent_id.as_deref()?;
        Some(Self::new(
            trace_id,
            parent_id,
            context.sample_mode,
            context.source,
        ))
    }
}

impl fmt::Display for SpanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trace_id={} parent_id={} sample_mode={}",
            self.trace_id, self.span_id, self.sample_mode
        )
    }
}

/// Trace context returned by a user-supplied extractor.
///
/// Accepts both `traceId`/`parentId` and the legacy `traceID`/`parentID`
/// field names when deserialised.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomTraceContext {
    /// Decimal trace id.
    #[serde(alias = "traceID")]
    pub trace_id: Option<String>,
    /// Decimal parent id.
    #[serde(alias = "parentID")]
    pub parent_id: Option<String>,
    /// Sampling decision.
    #[serde(default)]
    pub sample_mode: SampleMode,
    /// Provenance.
    #[serde(default)]
    pub source: TraceSource,
}

impl CustomTraceContext {
    /// Creates a trace context sourced from the event.
    pub fn new(
        trace_id: impl Into<String>,
        parent_id: impl Into<String>,
        sample_mode: SampleMode,
    ) -> Self {
        Self {
            trace_id: Some(trace_id.into()),
            parent_id: Some(parent_id.into()),
            sample_mode,
            source: TraceSource::Event,
        }
    }
}

/// The parts of the Lambda invocation context extraction cares about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvocationContext {
    /// The AWS request id of this invocation.
    pub request_id: String,
    /// ARN of the invoked function.
    pub invoked_function_arn: String,
    /// The `custom` map of the client context, if the caller supplied one.
    pub client_custom: Option<Value>,
}

impl InvocationContext {
    /// Creates a context for the given request id.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Self::default()
        }
    }

    /// Sets the client context `custom` map.
    pub fn with_client_custom(mut self, custom: Value) -> Self {
        self.client_custom = Some(custom);
        self
    }
}

impl From<&LambdaContext> for InvocationContext {
    fn from(ctx: &LambdaContext) -> Self {
        // Values set by the Datadog tracer are JSON documents carried as strings.
        let client_custom = ctx.client_context.as_ref().map(|client| {
            Value::Object(
                client
                    .custom
                    .iter()
                    .map(|(key, value)| {
                        let parsed = serde_json::from_str::<Value>(value)
                            .ok()
                            .filter(Value::is_object)
                            .unwrap_or_else(|| Value::String(value.clone()));
                        (key.clone(), parsed)
                    })
                    .collect(),
            )
        });

        Self {
            request_id: ctx.request_id.clone(),
            invoked_function_arn: ctx.invoked_function_arn.clone(),
            client_custom,
        }
    }
}
