//! Event-specific trace context extractors.
//!
//! One extractor per event shape recognised by [`classify`]. The client
//! context and custom extractors do not read the event shape and are driven
//! directly by the pipeline.
//!
//! [`classify`]: crate::classify::classify

use crate::classify::EventKind;
use crate::extractor::EventTraceExtractor;

pub mod app_sync;
pub mod custom;
pub mod event_bridge;
pub mod event_bridge_sns;
pub mod event_bridge_sqs;
pub mod http;
pub mod kinesis;
pub mod lambda_context;
pub mod sns;
pub mod sns_sqs;
pub mod sqs;
pub mod step_function;

pub use app_sync::AppSyncEventExtractor;
pub use custom::{CustomTraceExtractor, FnTraceExtractor};
pub use event_bridge::EventBridgeEventExtractor;
pub use event_bridge_sns::EventBridgeSnsEventExtractor;
pub use event_bridge_sqs::EventBridgeSqsEventExtractor;
pub use http::{HttpEventExtractor, HttpEventSubType};
pub use kinesis::KinesisEventExtractor;
pub use lambda_context::LambdaContextExtractor;
pub use sns::SnsEventExtractor;
pub use sns_sqs::SnsSqsEventExtractor;
pub use sqs::SqsEventExtractor;
pub use step_function::StepFunctionEventExtractor;

/// Returns the extractor for an event kind.
pub fn extractor_for(kind: EventKind) -> &'static dyn EventTraceExtractor {
    match kind {
        EventKind::EventBridgeSqs => &EventBridgeSqsEventExtractor,
        EventKind::EventBridgeSns => &EventBridgeSnsEventExtractor,
        EventKind::SnsSqs => &SnsSqsEventExtractor,
        EventKind::Sns => &SnsEventExtractor,
        EventKind::Sqs => &SqsEventExtractor,
        EventKind::Kinesis => &KinesisEventExtractor,
        EventKind::AppSync => &AppSyncEventExtractor,
        EventKind::Http => &HttpEventExtractor,
        EventKind::EventBridge => &EventBridgeEventExtractor,
        EventKind::StepFunction => &StepFunctionEventExtractor,
    }
}
