//! Step Functions execution context and deterministic trace ids.
//!
//! Step Functions invocations carry no propagation headers. Every state of
//! one execution instead derives the same trace id from the execution ARN, and
//! a per-state parent id from the execution ARN, state name and entry time.
//! The hash scheme must match the one used by Datadog's log intake so that
//! ids computed here and ids computed from execution logs correlate.

use crate::context::{SampleMode, SpanContext, TraceSource};
use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::debug;

/// Identity of one Step Functions execution and state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepFunctionContext {
    /// Execution name.
    #[serde(rename = "step_function.execution_name")]
    pub execution_name: String,
    /// Execution ARN.
    #[serde(rename = "step_function.execution_id")]
    pub execution_id: String,
    /// Execution input document.
    #[serde(rename = "step_function.execution_input")]
    pub execution_input: Value,
    /// IAM role the execution runs as.
    #[serde(rename = "step_function.execution_role_arn")]
    pub execution_role_arn: String,
    /// Execution start time.
    #[serde(rename = "step_function.execution_start_time")]
    pub execution_start_time: String,
    /// State machine name.
    #[serde(rename = "step_function.state_machine_name")]
    pub state_machine_name: String,
    /// State machine ARN.
    #[serde(rename = "step_function.state_machine_arn")]
    pub state_machine_arn: String,
    /// Time the current state was entered.
    #[serde(rename = "step_function.state_entered_time")]
    pub state_entered_time: String,
    /// Current state name.
    #[serde(rename = "step_function.state_name")]
    pub state_name: String,
    /// Retry count of the current state.
    #[serde(rename = "step_function.state_retry_count")]
    pub state_retry_count: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContextObject {
    execution: ExecutionObject,
    state: StateObject,
    state_machine: StateMachineObject,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExecutionObject {
    id: String,
    name: String,
    role_arn: String,
    start_time: String,
    #[serde(default)]
    input: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StateObject {
    name: String,
    entered_time: String,
    retry_count: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StateMachineObject {
    id: String,
    name: String,
}

impl StepFunctionContext {
    /// Reads the context object Step Functions passes as the Lambda payload.
    ///
    /// Accepts the object at the top level or, for the legacy
    /// `arn:aws:states:::lambda:invoke` integration, nested under `Payload`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not contain a complete context
    /// object with correctly typed fields.
    pub fn from_event(event: &Value) -> Result<Self, ExtractError> {
        let object = event.as_object().ok_or(ExtractError::InvalidField("event"))?;

        if !object.contains_key("Execution")
            && let Some(payload) = object.get("Payload")
        {
            return Self::from_context_object(payload);
        }

        Self::from_context_object(event)
    }

    fn from_context_object(value: &Value) -> Result<Self, ExtractError> {
        let raw = ContextObject::deserialize(value)?;

        let execution_input = match raw.execution.input {
            Value::Null => Value::Object(Map::new()),
            input => input,
        };

        Ok(Self {
            execution_name: raw.execution.name,
            execution_id: raw.execution.id,
            execution_input,
            execution_role_arn: raw.execution.role_arn,
            execution_start_time: raw.execution.start_time,
            state_machine_name: raw.state_machine.name,
            state_machine_arn: raw.state_machine.id,
            state_entered_time: raw.state.entered_time,
            state_name: raw.state.name,
            state_retry_count: raw.state.retry_count,
        })
    }

    /// Derives the trace identity shared by every state of this execution.
    pub fn span_context(&self) -> SpanContext {
        let trace_id = deterministic_hash(&self.execution_id);
        let parent_id = deterministic_hash(&format!(
            "{}#{}#{}",
            self.execution_id, self.state_name, self.state_entered_time
        ));

        SpanContext::new(trace_id, parent_id, SampleMode::AutoKeep, TraceSource::Event)
    }
}

/// Returns `true` when `value` has the Execution/State/StateMachine shape.
///
/// Structural check only; field types are validated by
/// [`StepFunctionContext::from_event`].
pub fn is_step_function_payload(value: &Value) -> bool {
    let has_markers = |v: &Value| {
        v.get("Execution").is_some_and(Value::is_object)
            && v.get("State").is_some_and(Value::is_object)
            && v.get("StateMachine").is_some_and(Value::is_object)
    };

    has_markers(value) || value.get("Payload").is_some_and(has_markers)
}

/// Hashes `s` into a non-zero 63-bit id rendered in decimal.
///
/// The MD5 digest is read as a 128-bit string; bit 0 is discarded, bits
/// 1..=63 are kept and the result is prefixed with an explicit zero bit.
/// An all-zero result becomes `"1"`.
///
/// ```
/// use lambda_trace_context::step_function::deterministic_hash;
///
/// assert_eq!(deterministic_hash("some_testing_random_string"), "2251275791555400689");
/// ```
pub fn deterministic_hash(s: &str) -> String {
    match deterministic_hash_bits(s) {
        0 => "1".to_string(),
        id => id.to_string(),
    }
}

fn deterministic_hash_bits(s: &str) -> u64 {
    let digest = md5::compute(s.as_bytes());
    let mut high = [0u8; 8];
    high.copy_from_slice(&digest.0[..8]);
    u64::from_be_bytes(high) & !(1u64 << 63)
}

/// Invocation-scoped memo of the Step Functions context.
///
/// Seeded by the first payload that yields a context; read-only afterwards.
/// One invocation never presents two different executions, so later
/// payloads are not re-parsed once a context is known.
#[derive(Debug, Default)]
pub struct StepFunctionContextCache {
    context: OnceLock<StepFunctionContext>,
}

impl StepFunctionContextCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached context, seeding it from `payload` if empty.
    pub fn observe(&self, payload: &Value) -> Option<&StepFunctionContext> {
        if let Some(context) = self.context.get() {
            return Some(context);
        }

        if !is_step_function_payload(payload) {
            return None;
        }

        match StepFunctionContext::from_event(payload) {
            Ok(context) => Some(self.context.get_or_init(|| context)),
            Err(error) => {
                debug!(%error, "Payload is not a Step Functions context");
                None
            }
        }
    }

    /// Returns the cached context without observing a payload.
    pub fn context(&self) -> Option<&StepFunctionContext> {
        self.context.get()
    }

    /// Derives the span context for `payload`, seeding the cache if needed.
    pub fn span_context(&self, payload: &Value) -> Option<SpanContext> {
        self.observe(payload).map(StepFunctionContext::span_context)
    }
}
