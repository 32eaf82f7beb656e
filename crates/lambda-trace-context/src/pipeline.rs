//! The ordered extraction pipeline.
//!
//! Sources are tried in a fixed order and the first one that yields a
//! context wins:
//!
//! 1. the user-supplied custom extractor, if configured
//! 2. the extractor selected by [`classify`] for the event shape
//! 3. the client context of a direct invocation
//! 4. the ambient X-Ray trace header
//!
//! When the winning context did not come from X-Ray, it is also written to
//! the X-Ray daemon so that both backbones share the same ids.
//!
//! [`classify`]: crate::classify::classify

use crate::classify::classify;
use crate::config::ExtractionConfig;
use crate::context::{InvocationContext, SpanContext, TraceSource};
use crate::extractor::ExtractionScope;
use crate::extractors::custom::{CustomTraceExtractor, run_custom_extractor};
use crate::extractors::{LambdaContextExtractor, extractor_for};
use crate::step_function::StepFunctionContextCache;
use crate::tracer::HostTracer;
use crate::xray::XrayEnvironment;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Result of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    parent: Option<SpanContext>,
    links: Vec<SpanContext>,
}

impl Extraction {
    fn from_contexts(contexts: Vec<SpanContext>) -> Self {
        Self {
            parent: contexts.first().cloned(),
            links: contexts,
        }
    }

    fn single(context: SpanContext) -> Self {
        Self::from_contexts(vec![context])
    }

    /// The context the invocation span should be parented to.
    pub fn parent(&self) -> Option<&SpanContext> {
        self.parent.as_ref()
    }

    /// Every context found, in record order.
    ///
    /// Holds more than one entry only for multi-record sources with span
    /// links enabled.
    pub fn links(&self) -> &[SpanContext] {
        &self.links
    }

    /// Returns `true` if no source yielded a context.
    pub fn is_empty(&self) -> bool {
        self.parent.is_none()
    }

    /// Splits into the parent and the links.
    pub fn into_parts(self) -> (Option<SpanContext>, Vec<SpanContext>) {
        (self.parent, self.links)
    }
}

/// Resolves the trace context of an invocation.
///
/// Holds no per-invocation state; one instance serves every invocation of
/// the process.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use lambda_trace_context::{
///     ExtractionConfig, InvocationContext, PropagatingTracer, TraceContextExtractor,
/// };
/// use lambda_trace_context::xray::XrayEnvironment;
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let extractor = TraceContextExtractor::new(
///     ExtractionConfig::default(),
///     Arc::new(PropagatingTracer::new()),
/// );
///
/// let event = json!({
///     "version": "2.0",
///     "rawQueryString": "",
///     "requestContext": {"http": {"method": "GET"}, "apiId": "abc"},
///     "headers": {
///         "x-datadog-trace-id": "797643193680388254",
///         "x-datadog-parent-id": "4110911582297405557",
///         "x-datadog-sampling-priority": "2"
///     }
/// });
///
/// let extraction = extractor
///     .extract_with_environment(&event, &InvocationContext::new("req-1"), &XrayEnvironment::default())
///     .await;
///
/// assert_eq!(extraction.parent().unwrap().trace_id(), "797643193680388254");
/// # }
/// ```
#[derive(Clone)]
pub struct TraceContextExtractor {
    config: ExtractionConfig,
    tracer: Arc<dyn HostTracer>,
    custom: Option<Arc<dyn CustomTraceExtractor>>,
}

impl fmt::Debug for TraceContextExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceContextExtractor")
            .field("config", &self.config)
            .field("custom", &self.custom.is_some())
            .finish_non_exhaustive()
    }
}

impl TraceContextExtractor {
    /// Creates a pipeline over `tracer`.
    pub fn new(config: ExtractionConfig, tracer: Arc<dyn HostTracer>) -> Self {
        Self {
            config,
            tracer,
            custom: None,
        }
    }

    /// Installs a user-supplied extractor that runs before every built-in source.
    pub fn with_custom_extractor(mut self, extractor: Arc<dyn CustomTraceExtractor>) -> Self {
        self.custom = Some(extractor);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Returns the host tracer.
    pub fn tracer(&self) -> &dyn HostTracer {
        self.tracer.as_ref()
    }

    /// Extracts the trace context of `event`, reading X-Ray state from the
    /// process environment.
    pub async fn extract(&self, event: &Value, context: &InvocationContext) -> Extraction {
        self.extract_with_environment(event, context, &XrayEnvironment::from_env())
            .await
    }

    /// Extracts the trace context of `event` against explicit X-Ray state.
    pub async fn extract_with_environment(
        &self,
        event: &Value,
        context: &InvocationContext,
        xray: &XrayEnvironment,
    ) -> Extraction {
        let step_functions = StepFunctionContextCache::new();
        step_functions.observe(event);

        let extraction = self.resolve(event, context, xray, &step_functions).await;

        if let Some(parent) = extraction.parent()
            && parent.source() != TraceSource::Xray
        {
            match step_functions.context() {
                Some(step_function) => xray.add_step_function_context(step_function),
                None => xray.add_trace_context(parent),
            }
        }

        extraction
    }

    async fn resolve(
        &self,
        event: &Value,
        context: &InvocationContext,
        xray: &XrayEnvironment,
        step_functions: &StepFunctionContextCache,
    ) -> Extraction {
        if let Some(custom) = &self.custom
            && let Some(span_context) = run_custom_extractor(
                custom.as_ref(),
                event,
                context,
                self.config.custom_extractor_timeout,
            )
            .await
        {
            return Extraction::single(span_context);
        }

        let scope = ExtractionScope::new(&self.config, self.tracer.as_ref(), step_functions);

        if let Some(kind) = classify(event) {
            debug!(%kind, "Classified event");
            let contexts = extractor_for(kind).extract(event, &scope);
            if !contexts.is_empty() {
                return Extraction::from_contexts(contexts);
            }
        }

        if let Some(span_context) = LambdaContextExtractor::new().extract(context, &scope) {
            return Extraction::single(span_context);
        }

        if let Some(span_context) = xray.extract() {
            return Extraction::single(span_context);
        }

        debug!("No trace context found");
        Extraction::default()
    }
}
