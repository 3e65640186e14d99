//! # Node Configuration
//!
//! Unified configuration for all node kinds and runtime parameters.
//!
//! The runtime only consumes a validated [`NodeConfig`]; how the values are
//! produced (files, environment, code) is up to the deploying process.
//! Validation is kind-aware: a Processor must name both topics, a Source only
//! its publish topic, and so on. Invalid configuration is fatal at startup.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The role a node plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Pull-based producer: the engine periodically asks it for one item.
    Source,
    /// Event-driven producer: data arrives via an external server the node owns.
    ServerSource,
    /// Subscribes, transforms, and re-publishes.
    Processor,
    /// Subscribes and consumes; publishes nothing.
    Sink,
}

impl NodeKind {
    /// Whether nodes of this kind own a publish topic.
    #[must_use]
    pub fn publishes(self) -> bool {
        matches!(self, Self::Source | Self::ServerSource | Self::Processor)
    }

    /// Whether nodes of this kind own a subscribe topic.
    #[must_use]
    pub fn subscribes(self) -> bool {
        matches!(self, Self::Processor | Self::Sink)
    }
}

/// How a cloud-pushing sink assigns partition keys to outgoing records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionMode {
    /// A fresh random key per record; no meaningful ordering across records.
    Random,
    /// Deterministic key derived from the record's sensor name, optionally
    /// rotated across `shards` key variants in round-robin order.
    SensorName,
}

/// Partition-key routing configuration for cloud-pushing sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Key assignment mode.
    pub mode: PartitionMode,
    /// Distinct key variants per sensor under [`PartitionMode::SensorName`].
    /// Ignored under [`PartitionMode::Random`].
    pub shards: u32,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            mode: PartitionMode::SensorName,
            shards: 1,
        }
    }
}

/// Complete configuration for one node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Node name, unique across the deployment.
    pub name: String,
    /// Provenance string stamped on every message this node originates.
    pub sensor_name: String,
    /// Topic this node consumes from (Processor, Sink).
    pub subscribe_topic: Option<String>,
    /// Topic this node publishes to (Source, ServerSource, Processor).
    pub publish_topic: Option<String>,
    /// Payload type tag every message published by this node must carry.
    /// Fixed at construction; the topic publisher enforces it.
    pub publish_data_type: Option<String>,
    /// Gap-based subsampling: publish 1 of every `gap + 1` items.
    pub gap: u32,
    /// Interval between liveness records while Running.
    pub heartbeat_interval: Duration,
    /// Maximum allowed silence before the node is classified stale.
    /// `None` disables heartbeat emission entirely.
    pub heartbeat_tolerance: Option<Duration>,
    /// Scheduling period between Source `produce` invocations.
    pub poll_interval: Duration,
    /// Depth of the ServerSource hand-off channel.
    pub buffer_size: usize,
    /// Partition-key routing for cloud-pushing sinks.
    pub partition: Option<PartitionConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            sensor_name: String::new(),
            subscribe_topic: None,
            publish_topic: None,
            publish_data_type: None,
            gap: 0,
            heartbeat_interval: Duration::from_secs(1),
            heartbeat_tolerance: Some(Duration::from_secs(5)),
            poll_interval: Duration::ZERO,
            buffer_size: 64,
            partition: None,
        }
    }
}

impl NodeConfig {
    /// Create a configuration with the given node name and defaults elsewhere.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Defaults for ServerSource deployments.
    ///
    /// Heartbeats are disabled by convention for server nodes: their "busy"
    /// state is indistinguishable from "waiting for external input", so a
    /// stale classification would be meaningless. Callers may re-enable them.
    #[must_use]
    pub fn server_source_defaults(name: impl Into<String>) -> Self {
        Self {
            heartbeat_tolerance: None,
            ..Self::named(name)
        }
    }

    /// Set the publish topic.
    #[must_use]
    pub fn publish_to(mut self, topic: impl Into<String>) -> Self {
        self.publish_topic = Some(topic.into());
        self
    }

    /// Set the subscribe topic.
    #[must_use]
    pub fn subscribe_to(mut self, topic: impl Into<String>) -> Self {
        self.subscribe_topic = Some(topic.into());
        self
    }

    /// Declare the payload type published by this node.
    #[must_use]
    pub fn with_publish_type(mut self, type_name: impl Into<String>) -> Self {
        self.publish_data_type = Some(type_name.into());
        self
    }

    /// Set the sensor name.
    #[must_use]
    pub fn with_sensor(mut self, sensor: impl Into<String>) -> Self {
        self.sensor_name = sensor.into();
        self
    }

    /// Set the subsampling gap.
    #[must_use]
    pub fn with_gap(mut self, gap: u32) -> Self {
        self.gap = gap;
        self
    }

    /// Validate this configuration for a node of the given kind.
    ///
    /// # Returns
    ///
    /// Returns `Err` if:
    /// - the name is empty,
    /// - a publishing kind has no publish topic,
    /// - a subscribing kind has no subscribe topic,
    /// - `shards == 0` under sensor-name partition mode,
    /// - the hand-off buffer or heartbeat interval is zero.
    pub fn validate(&self, kind: NodeKind) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if kind.publishes() && self.publish_topic.is_none() {
            return Err(ConfigError::MissingPublishTopic {
                node: self.name.clone(),
                kind,
            });
        }
        if kind.publishes() && self.publish_data_type.is_none() {
            return Err(ConfigError::MissingPublishType {
                node: self.name.clone(),
                kind,
            });
        }
        if kind.subscribes() && self.subscribe_topic.is_none() {
            return Err(ConfigError::MissingSubscribeTopic {
                node: self.name.clone(),
                kind,
            });
        }
        if let Some(partition) = &self.partition {
            if partition.mode == PartitionMode::SensorName && partition.shards == 0 {
                return Err(ConfigError::ZeroShards {
                    node: self.name.clone(),
                });
            }
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize {
                node: self.name.clone(),
            });
        }
        if self.heartbeat_tolerance.is_some() && self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ZeroHeartbeatInterval {
                node: self.name.clone(),
            });
        }
        Ok(())
    }
}
