//! # Error Types
//!
//! Defines error types for the data model: codec failures and invalid
//! node configuration.

use crate::config::NodeKind;
use thiserror::Error;

/// Errors from encoding or decoding messages through the type registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The message's type tag has no registered decoder in this process.
    #[error("Unknown payload type '{type_name}': register it before decoding")]
    UnknownType { type_name: String },

    /// A type name was registered twice with different decoders.
    ///
    /// Re-registering the same decoder is idempotent; conflicting
    /// registrations fail loudly here instead of silently at decode time.
    #[error("Payload type '{type_name}' already registered with a different decoder")]
    DuplicateRegistration { type_name: String },

    /// Serialization of a payload or envelope failed.
    #[error("Failed to encode '{type_name}': {reason}")]
    Encode { type_name: String, reason: String },

    /// Deserialization of a payload or envelope failed.
    #[error("Failed to decode '{type_name}': {reason}")]
    Decode { type_name: String, reason: String },
}

/// Errors from invalid node configuration.
///
/// These are fatal at startup: a node with an invalid configuration never
/// reaches the Running state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Node name is empty.
    #[error("Node name must not be empty")]
    EmptyName,

    /// A node kind that publishes has no publish topic configured.
    #[error("Node '{node}' ({kind:?}) requires a publish topic")]
    MissingPublishTopic { node: String, kind: NodeKind },

    /// A publishing node has not declared its payload type.
    #[error("Node '{node}' ({kind:?}) must declare its publish payload type")]
    MissingPublishType { node: String, kind: NodeKind },

    /// A node kind that subscribes has no subscribe topic configured.
    #[error("Node '{node}' ({kind:?}) requires a subscribe topic")]
    MissingSubscribeTopic { node: String, kind: NodeKind },

    /// Sensor-name partition mode requires at least one shard.
    #[error("Node '{node}': partition mode 'sensor_name' requires shards >= 1")]
    ZeroShards { node: String },

    /// The server-source hand-off buffer cannot be empty.
    #[error("Node '{node}': buffer_size must be >= 1")]
    ZeroBufferSize { node: String },

    /// Heartbeats enabled with a zero interval.
    #[error("Node '{node}': heartbeat_interval must be non-zero")]
    ZeroHeartbeatInterval { node: String },
}

/// Node lifecycle states.
///
/// `Errored` is terminal and reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NodeState {
    /// Constructed, not yet started.
    Created,
    /// Running the `initialize` hook.
    Initializing,
    /// Main loop active.
    Running,
    /// Shutdown requested; letting the in-flight callback finish.
    Draining,
    /// Clean exit.
    Stopped,
    /// Fatal failure (configuration, initialization, or serve).
    Errored,
}

impl NodeState {
    /// Whether this state can never be left.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Errored)
    }
}
