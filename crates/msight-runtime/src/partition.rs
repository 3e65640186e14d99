//! # Partition Router
//!
//! Assigns the partition/shard key cloud-pushing sinks attach to each
//! outgoing record. The router only ever looks at the message envelope's
//! sensor name, never at payload content.
//!
//! ## Ordering
//!
//! A single key (`shards == 1`) preserves publish order for that key at the
//! downstream consumer. Rotating one sensor across N key variants spreads
//! its load over N shards but forfeits total ordering - order is preserved
//! within each individual key only.

use msight_types::config::{PartitionConfig, PartitionMode};
use msight_types::{ConfigError, Envelope};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Partition-key assignment policy for one sink node.
#[derive(Debug)]
pub struct PartitionRouter {
    mode: PartitionMode,
    shards: u32,
    /// Next slot per sensor, under sensor-name rotation.
    rotation: Mutex<HashMap<String, u32>>,
}

impl PartitionRouter {
    /// Build a router from validated partition configuration.
    ///
    /// `shards` is only meaningful under [`PartitionMode::SensorName`]; under
    /// [`PartitionMode::Random`] it is ignored.
    pub fn from_config(node: &str, config: &PartitionConfig) -> Result<Self, ConfigError> {
        match config.mode {
            PartitionMode::SensorName if config.shards == 0 => Err(ConfigError::ZeroShards {
                node: node.to_string(),
            }),
            PartitionMode::Random => {
                if config.shards != 0 {
                    debug!(node, shards = config.shards, "Shard count ignored under random partition mode");
                }
                Ok(Self {
                    mode: PartitionMode::Random,
                    shards: 1,
                    rotation: Mutex::new(HashMap::new()),
                })
            }
            PartitionMode::SensorName => Ok(Self {
                mode: PartitionMode::SensorName,
                shards: config.shards,
                rotation: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The configured mode.
    #[must_use]
    pub fn mode(&self) -> PartitionMode {
        self.mode
    }

    /// Assign the partition key for one outgoing record.
    pub fn key_for(&self, envelope: &Envelope) -> String {
        match self.mode {
            PartitionMode::Random => Uuid::new_v4().to_string(),
            PartitionMode::SensorName => {
                if self.shards == 1 {
                    return envelope.sensor_name.clone();
                }
                let mut rotation = self.rotation.lock();
                let slot = rotation
                    .entry(envelope.sensor_name.clone())
                    .or_insert(0);
                let key = format!("{}-{}", envelope.sensor_name, *slot);
                *slot = (*slot + 1) % self.shards;
                key
            }
        }
    }
}
