//! HTTP event extractor for API Gateway, ALB and Function URL triggers.
//!
//! Trace headers are read from `headers`, or from `multiValueHeaders` for
//! REST APIs and ALBs configured for multi-value headers. When a Lambda
//! authorizer ran for the request, the authorizer's own trace context is
//! injected into `requestContext.authorizer` and takes precedence, so the
//! authorizer span and the handler span share one trace.

use crate::context::SpanContext;
use crate::error::ExtractError;
use crate::extractor::{EventTraceExtractor, ExtractionScope, decode_base64_json, normalize_headers};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Header the authorizer sets to the request id it authorised.
pub const AUTHORIZING_REQUEST_ID_HEADER: &str = "x-datadog-authorizing-requestid";

const API_GATEWAY_V2_VERSION: &str = "2.0";

/// The API Gateway flavour that produced an HTTP event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpEventSubType {
    /// REST API (payload format 1.0).
    ApiGatewayV1,
    /// HTTP API (payload format 2.0).
    ApiGatewayV2,
    /// WebSocket API.
    ApiGatewayWebSocket,
    /// ALB, Function URL or anything else with headers.
    Unknown,
}

impl HttpEventSubType {
    /// Detects the sub-type from the event shape.
    pub fn detect(event: &Value) -> Self {
        let request_context = event.get("requestContext");

        if request_context.is_some_and(|rc| rc.get("stage").is_some())
            && event.get("httpMethod").is_some()
            && event.get("resource").is_some()
        {
            return HttpEventSubType::ApiGatewayV1;
        }

        if let Some(rc) = request_context
            && event.get("version").and_then(Value::as_str) == Some(API_GATEWAY_V2_VERSION)
            && event.get("rawQueryString").is_some()
            && !rc
                .get("domainName")
                .and_then(Value::as_str)
                .is_some_and(|domain| domain.contains("lambda-url"))
        {
            return HttpEventSubType::ApiGatewayV2;
        }

        if request_context.is_some_and(|rc| rc.get("messageDirection").is_some()) {
            return HttpEventSubType::ApiGatewayWebSocket;
        }

        HttpEventSubType::Unknown
    }

    /// Returns the sub-type name used in span tags.
    pub fn as_str(self) -> &'static str {
        match self {
            HttpEventSubType::ApiGatewayV1 => "api-gateway-rest-api",
            HttpEventSubType::ApiGatewayV2 => "api-gateway-http-api",
            HttpEventSubType::ApiGatewayWebSocket => "api-gateway-websocket",
            HttpEventSubType::Unknown => "unknown-sub-type",
        }
    }
}

impl fmt::Display for HttpEventSubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extractor for header-carrying request events.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpEventExtractor;

impl HttpEventExtractor {
    /// Creates a new HTTP event extractor.
    pub fn new() -> Self {
        Self
    }

    /// Extracts from `event`, optionally trying the authorizer context first.
    pub(crate) fn extract_with(
        event: &Value,
        scope: &ExtractionScope<'_>,
        decode_authorizer_context: bool,
    ) -> Option<SpanContext> {
        if decode_authorizer_context {
            let sub_type = HttpEventSubType::detect(event);
            match injected_authorizer_headers(event, sub_type) {
                Ok(Some(injected)) => {
                    let context = normalize_headers(&injected)
                        .and_then(|headers| scope.tracer.extract(&headers));
                    if let Some(ref context) = context {
                        debug!(%context, %sub_type, "Extracted trace context from authorizer event");
                    }
                    return context;
                }
                Ok(None) => {}
                Err(error) => {
                    debug!(%error, "Unable to extract trace context from authorizer event");
                }
            }
        }

        let headers = event
            .get("headers")
            .filter(|headers| !headers.is_null())
            .or_else(|| event.get("multiValueHeaders"))?;
        let headers = normalize_headers(headers)?;

        let context = scope.tracer.extract(&headers)?;
        debug!(%context, "Extracted trace context from HTTP event");
        Some(context)
    }
}

impl EventTraceExtractor for HttpEventExtractor {
    fn extract(&self, event: &Value, scope: &ExtractionScope<'_>) -> Vec<SpanContext> {
        Self::extract_with(event, scope, scope.config.decode_authorizer_context)
            .into_iter()
            .collect()
    }
}

/// Returns the header map injected by a Lambda authorizer, if it applies to
/// this request.
///
/// `Ok(None)` means no authorizer context is present. An injected map from a
/// cached authorization describes an earlier request and is rejected.
pub fn injected_authorizer_headers(
    event: &Value,
    sub_type: HttpEventSubType,
) -> Result<Option<Value>, ExtractError> {
    let Some(authorizer) = event
        .get("requestContext")
        .and_then(|rc| rc.get("authorizer"))
    else {
        return Ok(None);
    };

    let raw = match sub_type {
        HttpEventSubType::ApiGatewayV2 => authorizer.get("lambda").and_then(|l| l.get("_datadog")),
        _ => authorizer.get("_datadog"),
    };
    let Some(raw) = raw.filter(|raw| !raw.is_null()) else {
        return Ok(None);
    };

    let encoded = raw
        .as_str()
        .ok_or(ExtractError::InvalidField("authorizer._datadog"))?;
    let injected = decode_base64_json(encoded)?;

    let integration_latency = authorizer
        .get("integrationLatency")
        .and_then(Value::as_f64)
        .unwrap_or_default();
    let request_id = event
        .get("requestContext")
        .and_then(|rc| rc.get("requestId"))
        .and_then(Value::as_str);
    let authorizing_request_id = injected
        .get(AUTHORIZING_REQUEST_ID_HEADER)
        .and_then(Value::as_str);

    if integration_latency > 0.0
        || (request_id.is_some() && request_id == authorizing_request_id)
    {
        return Ok(Some(injected));
    }

    Err(ExtractError::CachedAuthorizer)
}
