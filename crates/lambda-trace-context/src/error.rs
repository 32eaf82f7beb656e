//! Error types for trace context extraction.
//!
//! Extraction itself never fails from the caller's point of view: parser
//! errors are converted into "this source contributes nothing" at the
//! extractor boundary. These types exist so that the individual parsers can
//! use `?` internally and log a meaningful reason when they give up.

use thiserror::Error;

/// A specialised Result type for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Reasons a single event source failed to yield trace headers.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ExtractError {
    /// An expected field was absent from the payload.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A field was present but had the wrong JSON type.
    #[error("field `{0}` has an unexpected type")]
    InvalidField(&'static str),

    /// A base64-encoded value could not be decoded.
    #[error("invalid base64 payload")]
    Base64(#[from] base64::DecodeError),

    /// A value could not be parsed as JSON.
    #[error("invalid JSON payload")]
    Json(#[from] serde_json::Error),

    /// The injected authorizer context belongs to a cached authorization.
    #[error("authorizer context is from a cached authorization")]
    CachedAuthorizer,
}

/// Errors raised while writing metadata to the X-Ray daemon.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum XrayError {
    /// The ambient trace header is absent or incomplete.
    #[error("X-Ray trace header not available")]
    MissingTraceHeader,

    /// The ambient trace header is not sampled.
    #[error("X-Ray trace is not sampled")]
    NotSampled,

    /// `AWS_XRAY_DAEMON_ADDRESS` is not set.
    #[error("X-Ray daemon address not set")]
    MissingDaemonAddress,

    /// `AWS_XRAY_DAEMON_ADDRESS` is not in `host:port` form.
    #[error("invalid X-Ray daemon address `{0}`")]
    InvalidDaemonAddress(String),

    /// The subsegment could not be serialised.
    #[error("failed to serialise subsegment")]
    Serialise(#[from] serde_json::Error),

    /// The UDP send failed.
    #[error("failed to send subsegment")]
    Io(#[from] std::io::Error),
}

/// Configuration loading error.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Figment failed to merge or extract the configuration.
    #[error("configuration error")]
    Figment(#[source] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Figment(Box::new(err))
    }
}
