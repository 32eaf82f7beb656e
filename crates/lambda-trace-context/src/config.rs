//! Configuration loading for trace context extraction.
//!
//! Configuration is layered with figment. Sources, in order of priority
//! (later sources override earlier):
//! 1. Default values (compiled in)
//! 2. Config file: `/var/task/datadog-trace.toml` (optional)
//! 3. Environment variables with the `DD_` prefix
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `DD_USE_SPAN_LINKS` | `use_span_links` | `false` |
//! | `DD_DECODE_AUTHORIZER_CONTEXT` | `decode_authorizer_context` | `true` |
//! | `DD_DATA_STREAMS_ENABLED` | `data_streams_enabled` | `false` |
//! | `DD_CUSTOM_EXTRACTOR_TIMEOUT` | `custom_extractor_timeout` (ms) | `1000` |

use crate::error::Result;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/var/task/datadog-trace.toml";
const ENV_PREFIX: &str = "DD_";

const ENV_KEYS: &[&str] = &[
    "use_span_links",
    "decode_authorizer_context",
    "data_streams_enabled",
    "custom_extractor_timeout",
];

/// Options threaded through every extractor call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Extract one context per record for multi-record sources.
    pub use_span_links: bool,
    /// Try the header map injected by an API Gateway Lambda authorizer.
    pub decode_authorizer_context: bool,
    /// Report a consume checkpoint for every queue, topic and stream record.
    pub data_streams_enabled: bool,
    /// Upper bound on a single call to the user-supplied extractor.
    #[serde(with = "duration_ms")]
    pub custom_extractor_timeout: Duration,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            use_span_links: false,
            decode_authorizer_context: true,
            data_streams_enabled: false,
            custom_extractor_timeout: Duration::from_millis(1000),
        }
    }
}

impl ExtractionConfig {
    /// Loads configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if a source contains a value of the wrong type.
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration using a custom config file path.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if a source contains a value of the wrong type.
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(ExtractionConfig::default()));

        if config_path.as_ref().exists() {
            figment = figment.merge(Toml::file(config_path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).filter(|key| {
            ENV_KEYS
                .iter()
                .any(|known| key.as_str().eq_ignore_ascii_case(known))
        }));

        Ok(figment.extract()?)
    }

    /// Creates a new config builder.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder::new()
    }
}

/// Builder for constructing configuration programmatically.
#[must_use = "builders do nothing unless .build() is called"]
#[derive(Debug, Default)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether multi-record sources yield one context per record.
    pub fn use_span_links(mut self, enabled: bool) -> Self {
        self.config.use_span_links = enabled;
        self
    }

    /// Sets whether the authorizer-injected header map is decoded.
    pub fn decode_authorizer_context(mut self, enabled: bool) -> Self {
        self.config.decode_authorizer_context = enabled;
        self
    }

    /// Sets whether consume checkpoints are reported.
    pub fn data_streams_enabled(mut self, enabled: bool) -> Self {
        self.config.data_streams_enabled = enabled;
        self
    }

    /// Sets the custom extractor timeout.
    pub fn custom_extractor_timeout(mut self, timeout: Duration) -> Self {
        self.config.custom_extractor_timeout = timeout;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ExtractionConfig {
        self.config
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
