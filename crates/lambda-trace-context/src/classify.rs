//! Structural classification of invocation payloads.
//!
//! Lambda does not say which service produced an event, so the shape of the
//! JSON payload decides. Checks run most-specific first: a wrapped envelope
//! (EventBridge inside SQS, SNS inside SQS) would otherwise be claimed by the
//! outer source.

use crate::step_function::is_step_function_payload;
use serde_json::Value;
use std::fmt;

/// The event shapes the pipeline knows how to extract from.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// SQS record whose body is an EventBridge event or Step Functions context.
    EventBridgeSqs,
    /// SNS record whose message is an EventBridge event or Step Functions context.
    EventBridgeSns,
    /// SQS record whose body is an SNS notification.
    SnsSqs,
    /// SNS notification.
    Sns,
    /// SQS message batch.
    Sqs,
    /// Kinesis stream batch.
    Kinesis,
    /// AppSync resolver request.
    AppSync,
    /// API Gateway, ALB, Function URL or any other header-carrying request.
    Http,
    /// EventBridge event.
    EventBridge,
    /// Step Functions context object.
    StepFunction,
}

impl EventKind {
    /// Returns a short name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::EventBridgeSqs => "eventbridge-sqs",
            EventKind::EventBridgeSns => "eventbridge-sns",
            EventKind::SnsSqs => "sns-sqs",
            EventKind::Sns => "sns",
            EventKind::Sqs => "sqs",
            EventKind::Kinesis => "kinesis",
            EventKind::AppSync => "appsync",
            EventKind::Http => "http",
            EventKind::EventBridge => "eventbridge",
            EventKind::StepFunction => "step-function",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selects the extractor for `event`, or `None` if no shape matches.
///
/// ```
/// use lambda_trace_context::classify::{classify, EventKind};
/// use serde_json::json;
///
/// let event = json!({"headers": {"x-datadog-trace-id": "1"}});
/// assert_eq!(classify(&event), Some(EventKind::Http));
/// assert_eq!(classify(&json!({"hello": "world"})), None);
/// ```
pub fn classify(event: &Value) -> Option<EventKind> {
    let record = first_record(event);
    let sqs_body = record.filter(|r| is_sqs_record(r)).and_then(sqs_body);
    let sns_message = record.and_then(sns_message);

    if sqs_body.as_ref().is_some_and(is_wrapped_event_bridge) {
        return Some(EventKind::EventBridgeSqs);
    }
    if sns_message.as_ref().is_some_and(is_wrapped_event_bridge) {
        return Some(EventKind::EventBridgeSns);
    }
    if sqs_body.as_ref().is_some_and(is_sns_notification) {
        return Some(EventKind::SnsSqs);
    }
    if record.is_some_and(|r| r.get("Sns").is_some()) {
        return Some(EventKind::Sns);
    }
    if record.is_some_and(is_sqs_record) {
        return Some(EventKind::Sqs);
    }
    if record.is_some_and(|r| r.get("kinesis").is_some_and(Value::is_object)) {
        return Some(EventKind::Kinesis);
    }
    if is_app_sync(event) {
        return Some(EventKind::AppSync);
    }
    if is_http(event) {
        return Some(EventKind::Http);
    }
    if event.get("detail-type").is_some() {
        return Some(EventKind::EventBridge);
    }
    if is_step_function_payload(event) {
        return Some(EventKind::StepFunction);
    }

    None
}

/// Parses a JSON document carried as a string, if it is one.
pub(crate) fn parse_embedded_json(value: &Value) -> Option<Value> {
    value
        .as_str()
        .and_then(|s| serde_json::from_str::<Value>(s).ok())
        .filter(Value::is_object)
}

/// Returns `true` for an EventBridge envelope or a Step Functions context.
pub(crate) fn is_wrapped_event_bridge(payload: &Value) -> bool {
    payload.get("detail-type").is_some()
        || is_step_function_payload(payload)
        || payload
            .get("_datadog")
            .is_some_and(is_step_function_payload)
}

fn first_record(event: &Value) -> Option<&Value> {
    event.get("Records")?.as_array()?.first()
}

fn is_sqs_record(record: &Value) -> bool {
    record.get("eventSource").and_then(Value::as_str) == Some("aws:sqs")
}

fn sqs_body(record: &Value) -> Option<Value> {
    parse_embedded_json(record.get("body")?)
}

fn sns_message(record: &Value) -> Option<Value> {
    parse_embedded_json(record.get("Sns")?.get("Message")?)
}

fn is_sns_notification(body: &Value) -> bool {
    body.get("Type").and_then(Value::as_str) == Some("Notification")
        && body.get("TopicArn").is_some()
}

fn is_app_sync(event: &Value) -> bool {
    event
        .get("info")
        .is_some_and(|info| info.get("selectionSetGraphQL").is_some())
        && event
            .get("request")
            .is_some_and(|request| request.get("headers").is_some())
}

fn is_http(event: &Value) -> bool {
    event.get("headers").is_some_and(Value::is_object)
        || event.get("multiValueHeaders").is_some_and(Value::is_object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step_function_context() -> Value {
        json!({
            "Execution": {"Id": "arn:aws:states:us-east-1:123456789012:execution:sm:run"},
            "State": {"Name": "one", "EnteredTime": "2024-01-01T00:00:00Z", "RetryCount": 0},
            "StateMachine": {"Id": "arn:aws:states:us-east-1:123456789012:stateMachine:sm", "Name": "sm"}
        })
    }

    fn sqs_event(body: &str) -> Value {
        json!({
            "Records": [{
                "messageId": "1",
                "body": body,
                "eventSource": "aws:sqs",
                "eventSourceARN": "arn:aws:sqs:us-east-1:123456789012:queue"
            }]
        })
    }

    fn sns_event(message: &str) -> Value {
        json!({
            "Records": [{
                "EventSource": "aws:sns",
                "Sns": {"Type": "Notification", "Message": message}
            }]
        })
    }

    #[test]
    fn test_plain_sqs() {
        assert_eq!(classify(&sqs_event("hello")), Some(EventKind::Sqs));
    }

    #[test]
    fn test_sqs_with_sns_notification_body() {
        let body = json!({
            "Type": "Notification",
            "TopicArn": "arn:aws:sns:us-east-1:123456789012:topic",
            "Message": "hi"
        })
        .to_string();

        assert_eq!(classify(&sqs_event(&body)), Some(EventKind::SnsSqs));
    }

    #[test]
    fn test_sqs_with_notification_without_topic_is_plain_sqs() {
        let body = json!({"Type": "Notification"}).to_string();
        assert_eq!(classify(&sqs_event(&body)), Some(EventKind::Sqs));
    }

    #[test]
    fn test_sqs_with_event_bridge_body() {
        let body = json!({"detail-type": "Order", "detail": {}}).to_string();
        assert_eq!(classify(&sqs_event(&body)), Some(EventKind::EventBridgeSqs));
    }

    #[test]
    fn test_sqs_with_step_function_body() {
        let direct = step_function_context().to_string();
        let nested = json!({"_datadog": step_function_context()}).to_string();

        assert_eq!(classify(&sqs_event(&direct)), Some(EventKind::EventBridgeSqs));
        assert_eq!(classify(&sqs_event(&nested)), Some(EventKind::EventBridgeSqs));
    }

    #[test]
    fn test_plain_sns() {
        assert_eq!(classify(&sns_event("hello")), Some(EventKind::Sns));
    }

    #[test]
    fn test_sns_with_event_bridge_message() {
        let message = json!({"detail-type": "Order", "detail": {}}).to_string();
        assert_eq!(classify(&sns_event(&message)), Some(EventKind::EventBridgeSns));
    }

    #[test]
    fn test_kinesis() {
        let event = json!({
            "Records": [{"eventSource": "aws:kinesis", "kinesis": {"data": "e30="}}]
        });
        assert_eq!(classify(&event), Some(EventKind::Kinesis));
    }

    #[test]
    fn test_app_sync_wins_over_http() {
        let event = json!({
            "info": {"selectionSetGraphQL": "{ id }"},
            "request": {"headers": {}},
            "headers": {}
        });
        assert_eq!(classify(&event), Some(EventKind::AppSync));
    }

    #[test]
    fn test_http_variants() {
        assert_eq!(classify(&json!({"headers": {}})), Some(EventKind::Http));
        assert_eq!(
            classify(&json!({"multiValueHeaders": {"a": ["b"]}})),
            Some(EventKind::Http)
        );
        assert_eq!(classify(&json!({"headers": null})), None);
    }

    #[test]
    fn test_event_bridge() {
        let event = json!({"detail-type": "Order", "source": "shop", "detail": {}});
        assert_eq!(classify(&event), Some(EventKind::EventBridge));
    }

    #[test]
    fn test_step_function_direct_and_legacy() {
        assert_eq!(
            classify(&step_function_context()),
            Some(EventKind::StepFunction)
        );
        assert_eq!(
            classify(&json!({"Payload": step_function_context()})),
            Some(EventKind::StepFunction)
        );
    }

    #[test]
    fn test_unknown_shapes() {
        assert_eq!(classify(&json!({})), None);
        assert_eq!(classify(&json!("string")), None);
        assert_eq!(classify(&json!([1, 2])), None);
        assert_eq!(classify(&json!({"Records": []})), None);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(EventKind::SnsSqs.to_string(), "sns-sqs");
        assert_eq!(EventKind::StepFunction.as_str(), "step-function");
    }
}
