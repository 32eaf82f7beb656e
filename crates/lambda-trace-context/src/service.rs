//! Invocation-scoped trace context state.

use crate::context::{
    HeaderMap, InvocationContext, PARENT_ID_HEADER, SAMPLING_PRIORITY_HEADER, SpanContext,
    TRACE_ID_HEADER, TraceSource,
};
use crate::pipeline::TraceContextExtractor;
use serde_json::Value;
use tracing::debug;

/// Holds the root trace context of the current invocation.
///
/// Lambda runs one invocation per process at a time, so the service is
/// driven through `&mut self`: [`extract`](Self::extract) at the start of
/// every invocation, then reads for the rest of it.
#[derive(Debug)]
pub struct TraceContextService {
    extractor: TraceContextExtractor,
    root: Option<SpanContext>,
    links: Vec<SpanContext>,
}

impl TraceContextService {
    /// Creates a service with no root context.
    pub fn new(extractor: TraceContextExtractor) -> Self {
        Self {
            extractor,
            root: None,
            links: Vec::new(),
        }
    }

    /// Resolves and stores the root context for a new invocation.
    ///
    /// State from the previous invocation is discarded first, including any
    /// scope the host tracer still has open. Returns the extracted context,
    /// not the tracer's active span.
    pub async fn extract(
        &mut self,
        event: &Value,
        context: &InvocationContext,
    ) -> Option<&SpanContext> {
        self.reset();
        self.extractor.tracer().close_scope();

        let (root, links) = self.extractor.extract(event, context).await.into_parts();
        self.root = root;
        self.links = links;
        self.root.as_ref()
    }

    /// The context outbound calls should propagate.
    ///
    /// The host tracer's active span wins over the extracted root.
    pub fn current_trace_context(&self) -> Option<SpanContext> {
        if let Some(active) = self.extractor.tracer().active_span_context() {
            debug!(trace_id = active.trace_id(), "Using trace context from active span");
            return Some(active);
        }
        self.root.clone()
    }

    /// Propagation headers for [`current_trace_context`](Self::current_trace_context).
    ///
    /// Empty when there is no context.
    pub fn current_trace_headers(&self) -> HeaderMap {
        let Some(context) = self.current_trace_context() else {
            return HeaderMap::new();
        };

        HeaderMap::from([
            (TRACE_ID_HEADER.to_string(), context.trace_id().to_string()),
            (PARENT_ID_HEADER.to_string(), context.span_id().to_string()),
            (
                SAMPLING_PRIORITY_HEADER.to_string(),
                context.sample_mode().to_string(),
            ),
        ])
    }

    /// The extracted root context.
    pub fn root_trace_context(&self) -> Option<&SpanContext> {
        self.root.as_ref()
    }

    /// Where the root context came from.
    pub fn trace_source(&self) -> Option<TraceSource> {
        self.root.as_ref().map(SpanContext::source)
    }

    /// Every context found for this invocation.
    pub fn span_links(&self) -> &[SpanContext] {
        &self.links
    }

    /// Forgets the root context.
    pub fn reset(&mut self) {
        self.root = None;
        self.links.clear();
    }
}
