//! Trace context extraction for AWS Lambda invocations.
//!
//! Every invocation is handed a JSON event whose shape depends on what
//! triggered it. This crate recognises the shape, finds the upstream trace
//! identity inside it, and resolves one parent context for the invocation
//! span, so that traces stay connected across API Gateway, SQS, SNS,
//! EventBridge, Kinesis, AppSync, Step Functions and direct invocations.
//!
//! # Architecture
//!
//! Resolution is an ordered fallback chain run by [`TraceContextExtractor`]:
//!
//! 1. a user-supplied [`CustomTraceExtractor`], bounded by a timeout
//! 2. the event-shape extractor chosen by [`classify`](classify::classify)
//! 3. the client context of a direct `Invoke` call
//! 4. the ambient X-Ray trace header (`_X_AMZN_TRACE_ID`)
//!
//! A context resolved from anything other than X-Ray is also written to the
//! X-Ray daemon as a metadata subsegment, fire-and-forget.
//!
//! Header-format parsing is delegated to the [`HostTracer`] running in the
//! function. [`PropagatingTracer`] understands Datadog and W3C headers;
//! [`NoopTracer`] is used when no tracer is installed.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use lambda_runtime::{Error, LambdaEvent, run, service_fn};
//! use lambda_trace_context::{
//!     ExtractionConfig, InvocationContext, PropagatingTracer, TraceContextExtractor,
//! };
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     lambda_trace_context::logging::init_tracing()?;
//!
//!     let extractor = Arc::new(TraceContextExtractor::new(
//!         ExtractionConfig::load()?,
//!         Arc::new(PropagatingTracer::new()),
//!     ));
//!
//!     run(service_fn(move |event: LambdaEvent<Value>| {
//!         let extractor = Arc::clone(&extractor);
//!         async move {
//!             let context = InvocationContext::from(&event.context);
//!             let extraction = extractor.extract(&event.payload, &context).await;
//!             if let Some(parent) = extraction.parent() {
//!                 tracing::info!(%parent, "Invocation parented");
//!             }
//!             Ok::<_, Error>(Value::Null)
//!         }
//!     }))
//!     .await
//! }
//! ```
//!
//! # Configuration
//!
//! See [`config`] for the `DD_*` environment variables and the optional
//! TOML file.

pub mod classify;
pub mod config;
pub mod context;
pub mod error;
pub mod extractor;
pub mod extractors;
pub mod ids;
pub mod logging;
pub mod pipeline;
pub mod service;
pub mod step_function;
pub mod tracer;
pub mod xray;

pub use classify::EventKind;
pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use context::{
    CustomTraceContext, HeaderMap, InvocationContext, SampleMode, SpanContext, TraceSource,
};
pub use error::{ConfigError, ExtractError, XrayError};
pub use extractor::{EventTraceExtractor, ExtractionScope};
pub use extractors::custom::{CustomTraceExtractor, FnTraceExtractor};
pub use pipeline::{Extraction, TraceContextExtractor};
pub use service::TraceContextService;
pub use step_function::{StepFunctionContext, StepFunctionContextCache};
pub use tracer::{CheckpointKind, HostTracer, NoopTracer, PropagatingTracer};
