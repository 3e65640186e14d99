//! # Runtime Error Types
//!
//! Node-level errors and their propagation policy: single-message failures
//! (`Callback`) are isolated at the engine boundary and never escalate;
//! `Configuration` and `Serve` are fatal to the node.

use msight_bus::BusError;
use msight_types::{CodecError, ConfigError};
use thiserror::Error;

/// Errors surfaced by node behaviors and the lifecycle engine.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Invalid or missing configuration; fatal at startup, the node never
    /// reaches Running.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A user-supplied produce/process/on-message hook failed. Caught at the
    /// engine boundary; the offending message is dropped and the loop
    /// continues.
    #[error("Callback failed: {0}")]
    Callback(String),

    /// The ServerSource `serve` hook terminated or failed. Fatal: no further
    /// ingestion path exists for the node.
    #[error("Serve hook failed: {0}")]
    Serve(String),

    /// Bus-level failure (publish/subscribe).
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Codec failure outside the bus path.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl NodeError {
    /// Wrap a callback failure message.
    pub fn callback(reason: impl Into<String>) -> Self {
        Self::Callback(reason.into())
    }

    /// Wrap a serve failure message.
    pub fn serve(reason: impl Into<String>) -> Self {
        Self::Serve(reason.into())
    }

    /// Whether this error must terminate the node.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Serve(_))
    }
}
