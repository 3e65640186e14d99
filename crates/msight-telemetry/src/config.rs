//! Telemetry configuration, sourced from the environment or built in code.

/// Configuration for [`crate::init_telemetry`].
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive string, e.g. `"info"` or `"msight_runtime=debug"`.
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json_logs: bool,
}

impl TelemetryConfig {
    /// Fallback filter when the configured one fails to parse.
    pub const DEFAULT_LOG_LEVEL: &'static str = "info";

    /// Build from `MSIGHT_LOG_LEVEL` / `MSIGHT_LOG_JSON`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            log_level: std::env::var("MSIGHT_LOG_LEVEL")
                .unwrap_or_else(|_| Self::DEFAULT_LOG_LEVEL.to_string()),
            json_logs: std::env::var("MSIGHT_LOG_JSON").is_ok(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
        }
    }
}
