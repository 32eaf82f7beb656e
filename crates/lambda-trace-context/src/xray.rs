//! Bridge to AWS X-Ray.
//!
//! Reads the ambient `_X_AMZN_TRACE_ID` header as a last-resort trace
//! context, and annotates the X-Ray segment with the Datadog ids resolved
//! from the event by sending a metadata subsegment to the X-Ray daemon.

use crate::context::{SpanContext, TraceSource};
use crate::error::XrayError;
use crate::ids::{sample_mode_from_xray, xray_parent_id_to_local, xray_trace_id_to_local};
use crate::step_function::StepFunctionContext;
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error};

/// Environment variable holding the ambient X-Ray trace header.
pub const TRACE_HEADER_ENV_VAR: &str = "_X_AMZN_TRACE_ID";
/// Environment variable holding the X-Ray daemon `host:port`.
pub const DAEMON_ADDRESS_ENV_VAR: &str = "AWS_XRAY_DAEMON_ADDRESS";

const SUBSEGMENT_NAME: &str = "datadog-metadata";
const SUBSEGMENT_NAMESPACE: &str = "datadog";
const TRACE_KEY: &str = "trace";
const STEP_FUNCTION_KEY: &str = "root_span_metadata";
const DATAGRAM_HEADER: &str = r#"{"format": "json", "version": 1}"#;

/// Parsed X-Ray trace header components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrayTraceHeader {
    /// The X-Ray root trace id (e.g., "1-5759e988-bd862e3fe1be46a994272793").
    pub root: String,
    /// The parent segment id (e.g., "53995c3f42cd8ad8").
    pub parent: String,
    /// The raw sampling flag.
    pub sampled: String,
}

impl XrayTraceHeader {
    /// Parses an X-Ray trace header string.
    ///
    /// The format is: `Root=1-{timestamp}-{random};Parent={parent_id};Sampled={0|1}`.
    /// All three fields are required. Unknown keys such as `Lineage` are
    /// ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use lambda_trace_context::xray::XrayTraceHeader;
    ///
    /// let header = "Root=1-5759e988-bd862e3fe1be46a994272793;Parent=53995c3f42cd8ad8;Sampled=1";
    /// let parsed = XrayTraceHeader::parse(header).unwrap();
    /// assert_eq!(parsed.root, "1-5759e988-bd862e3fe1be46a994272793");
    /// assert_eq!(parsed.parent, "53995c3f42cd8ad8");
    /// assert!(parsed.is_sampled());
    /// ```
    pub fn parse(header: &str) -> Option<Self> {
        let mut root = None;
        let mut parent = None;
        let mut sampled = None;

        for part in header.split(';') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                match key {
                    "Root" => root = Some(value.to_string()),
                    "Parent" => parent = Some(value.to_string()),
                    "Sampled" => sampled = Some(value.to_string()),
                    _ => {}
                }
            }
        }

        Some(Self {
            root: root?,
            parent: parent?,
            sampled: sampled?,
        })
    }

    /// Returns `true` only for `Sampled=1`.
    pub fn is_sampled(&self) -> bool {
        self.sampled.trim() == "1"
    }

    /// Converts the header into the decimal id space.
    ///
    /// Returns `None` if either id is malformed.
    pub fn to_span_context(&self) -> Option<SpanContext> {
        let Some(parent_id) = xray_parent_id_to_local(&self.parent) else {
            debug!(parent = %self.parent, "Couldn't parse X-Ray parent id");
            return None;
        };
        let Some(trace_id) = xray_trace_id_to_local(&self.root) else {
            debug!(root = %self.root, "Couldn't parse X-Ray trace id");
            return None;
        };

        Some(SpanContext::new(
            trace_id,
            parent_id,
            sample_mode_from_xray(u8::from(self.is_sampled())),
            TraceSource::Xray,
        ))
    }

    /// Returns the raw X-Ray trace header string.
    pub fn to_header_string(&self) -> String {
        format!(
            "Root={};Parent={};Sampled={}",
            self.root, self.parent, self.sampled
        )
    }
}

impl fmt::Display for XrayTraceHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_header_string())
    }
}

/// A metadata-only X-Ray subsegment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XraySubsegment {
    /// Random 16-hex-digit subsegment id.
    pub id: String,
    /// X-Ray root trace id, verbatim.
    pub trace_id: String,
    /// X-Ray parent segment id, verbatim.
    pub parent_id: String,
    /// Subsegment name.
    pub name: &'static str,
    /// Epoch seconds.
    pub start_time: f64,
    /// Epoch seconds, equal to `start_time`.
    pub end_time: f64,
    /// Always `"subsegment"`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// `{"datadog": {key: payload}}`.
    pub metadata: Value,
}

impl XraySubsegment {
    /// Creates a subsegment under `header` carrying `payload` at `key`.
    pub fn new(header: &XrayTraceHeader, key: &str, payload: Value) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or_default();

        Self {
            id: hex::encode(rand::random::<[u8; 8]>()),
            trace_id: header.root.clone(),
            parent_id: header.parent.clone(),
            name: SUBSEGMENT_NAME,
            start_time: now,
            end_time: now,
            kind: "subsegment",
            metadata: json!({ SUBSEGMENT_NAMESPACE: { key: payload } }),
        }
    }

    /// Frames the subsegment for the daemon's UDP protocol.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be serialised.
    pub fn to_datagram(&self) -> Result<String, XrayError> {
        let body = serde_json::to_string(self)?;
        Ok(format!("{DATAGRAM_HEADER}\n{body}"))
    }
}

/// The X-Ray state of the current invocation.
///
/// Read fresh from the environment on every extraction; Lambda rewrites
/// `_X_AMZN_TRACE_ID` before each invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XrayEnvironment {
    trace_header: Option<String>,
    daemon_address: Option<String>,
}

impl XrayEnvironment {
    /// Creates an environment from explicit values.
    pub fn new(trace_header: Option<String>, daemon_address: Option<String>) -> Self {
        Self {
            trace_header,
            daemon_address,
        }
    }

    /// Reads `_X_AMZN_TRACE_ID` and `AWS_XRAY_DAEMON_ADDRESS`.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var(TRACE_HEADER_ENV_VAR).ok(),
            std::env::var(DAEMON_ADDRESS_ENV_VAR).ok(),
        )
    }

    /// Returns the parsed ambient trace header.
    pub fn header(&self) -> Option<XrayTraceHeader> {
        let Some(raw) = self.trace_header.as_deref() else {
            debug!("Couldn't read X-Ray trace header from env");
            return None;
        };

        let header = XrayTraceHeader::parse(raw);
        if header.is_none() {
            debug!(header = raw, "Couldn't parse X-Ray trace header from env");
        }
        header
    }

    /// Returns the ambient trace context, tagged with source `Xray`.
    pub fn extract(&self) -> Option<SpanContext> {
        let context = self.header()?.to_span_context()?;
        debug!(%context, "Extracted trace context from X-Ray header");
        Some(context)
    }

    /// Annotates the X-Ray segment with the resolved Datadog ids.
    pub fn add_trace_context(&self, context: &SpanContext) {
        let metadata = json!({
            "trace-id": context.trace_id(),
            "parent-id": context.span_id(),
            "sampling-priority": context.sample_mode().priority(),
        });
        self.add(TRACE_KEY, metadata);
    }

    /// Annotates the X-Ray segment with the Step Functions context.
    pub fn add_step_function_context(&self, context: &StepFunctionContext) {
        match serde_json::to_value(context) {
            Ok(metadata) => self.add(STEP_FUNCTION_KEY, metadata),
            Err(error) => error!(%error, "Couldn't add Step Functions metadata to X-Ray"),
        }
    }

    fn add(&self, key: &str, metadata: Value) {
        let datagram = match self.subsegment(key, metadata) {
            Ok(datagram) => datagram,
            Err(error @ (XrayError::MissingTraceHeader | XrayError::NotSampled)) => {
                debug!(%error, "Not sending X-Ray metadata subsegment");
                return;
            }
            Err(error) => {
                error!(%error, "Couldn't build X-Ray metadata subsegment");
                return;
            }
        };

        self.send(datagram);
    }

    fn subsegment(&self, key: &str, metadata: Value) -> Result<String, XrayError> {
        let header = self.header().ok_or(XrayError::MissingTraceHeader)?;
        if sample_mode_from_xray(u8::from(header.is_sampled())).is_reject() {
            return Err(XrayError::NotSampled);
        }

        XraySubsegment::new(&header, key, metadata).to_datagram()
    }

    fn send(&self, datagram: String) {
        let address = match self.daemon_address() {
            Ok(address) => address,
            Err(error) => {
                debug!(%error, "Not sending X-Ray metadata subsegment");
                return;
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match send_datagram(&address, datagram.as_bytes()).await {
                        Ok(bytes) => debug!(bytes, "X-Ray daemon received metadata payload"),
                        Err(error) => debug!(%error, "Error submitting to X-Ray daemon"),
                    }
                });
            }
            Err(_) => match send_datagram_blocking(&address, datagram.as_bytes()) {
                Ok(bytes) => debug!(bytes, "X-Ray daemon received metadata payload"),
                Err(error) => debug!(%error, "Error submitting to X-Ray daemon"),
            },
        }
    }

    fn daemon_address(&self) -> Result<String, XrayError> {
        let address = self
            .daemon_address
            .as_deref()
            .ok_or(XrayError::MissingDaemonAddress)?;

        match address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(address.to_string())
            }
            _ => Err(XrayError::InvalidDaemonAddress(address.to_string())),
        }
    }
}

async fn send_datagram(address: &str, payload: &[u8]) -> Result<usize, XrayError> {
    let socket = tokio::net::UdpSocket::bind("0.0.0.0:0").await?;
    Ok(socket.send_to(payload, address).await?)
}

fn send_datagram_blocking(address: &str, payload: &[u8]) -> Result<usize, XrayError> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
    socket.set_nonblocking(true)?;
    Ok(socket.send_to(payload, address)?)
}
