//! Diagnostic log setup.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the Datadog log level.
pub const LOG_LEVEL_ENV_VAR: &str = "DD_LOG_LEVEL";

/// Installs a global fmt subscriber.
///
/// The filter comes from `RUST_LOG`, else `DD_LOG_LEVEL`, else `info`.
/// Lambda timestamps every log line, so the formatter omits them.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).without_time())
        .with(env_filter())
        .try_init()
}

fn env_filter() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    std::env::var(LOG_LEVEL_ENV_VAR)
        .ok()
        .and_then(|level| EnvFilter::try_new(level.to_ascii_lowercase()).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_filter_from_rust_log() {
        temp_env::with_vars(
            [("RUST_LOG", Some("lambda_trace_context=trace")), (LOG_LEVEL_ENV_VAR, Some("error"))],
            || {
                assert_eq!(env_filter().to_string(), "lambda_trace_context=trace");
            },
        );
    }

    #[test]
    #[serial]
    fn test_filter_from_dd_log_level() {
        temp_env::with_vars(
            [("RUST_LOG", None), (LOG_LEVEL_ENV_VAR, Some("DEBUG"))],
            || {
                assert_eq!(env_filter().to_string(), "debug");
            },
        );
    }

    #[test]
    #[serial]
    fn test_default_filter() {
        temp_env::with_vars(
            [("RUST_LOG", None::<&str>), (LOG_LEVEL_ENV_VAR, None)],
            || {
                assert_eq!(env_filter().to_string(), "info");
            },
        );
    }
}
