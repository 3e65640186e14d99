//! # MSight Telemetry
//!
//! Structured logging for MSight node processes.
//!
//! Every node binary initializes logging once at startup; all runtime crates
//! emit through `tracing` with consistent fields (`node`, `topic`, `sensor`).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use msight_telemetry::{TelemetryConfig, init_telemetry};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//!     // node code here
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MSIGHT_LOG_LEVEL` | `info` | Log level filter (EnvFilter syntax) |
//! | `MSIGHT_LOG_JSON` | unset | Any value switches to JSON output |

mod config;

pub use config::TelemetryConfig;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Telemetry initialization errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Guard returned by [`init_telemetry`]; keep it alive for the process
/// lifetime.
pub struct TelemetryGuard {
    _private: (),
}

/// Initialize structured logging for this process.
///
/// Installs a global `tracing` subscriber with an environment-driven filter
/// and either human-readable or JSON output.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let filter = EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new(TelemetryConfig::DEFAULT_LOG_LEVEL));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    tracing::info!(
        log_level = %config.log_level,
        json = config.json_logs,
        "Telemetry initialized"
    );
    Ok(TelemetryGuard { _private: () })
}
