//! # Heartbeat Records
//!
//! The liveness record each Running node emits on a fixed interval, and the
//! shape the status query aggregates. The record carries the node's own
//! tolerance so the query surface needs no per-node configuration.

use msight_types::envelope::wall_clock_ms;
use msight_types::{NodeKind, NodeState};
use serde::{Deserialize, Serialize};

/// One node's most recent liveness record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    /// Node name, unique across the deployment.
    pub node: String,
    /// Node role.
    pub kind: NodeKind,
    /// Declared publish topic, if any.
    pub publish_topic: Option<String>,
    /// Declared subscribe topic, if any.
    pub subscribe_topic: Option<String>,
    /// Lifecycle state at emission time. Terminal transitions write a final
    /// record so failed nodes stay visible instead of merely going silent.
    pub state: NodeState,
    /// The node's staleness tolerance in milliseconds, if heartbeats are
    /// enabled for it.
    pub tolerance_ms: Option<u64>,
    /// Wall-clock emission time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl HeartbeatRecord {
    /// Create a Running record stamped now, with no declared topics.
    #[must_use]
    pub fn new(node: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            node: node.into(),
            kind,
            publish_topic: None,
            subscribe_topic: None,
            state: NodeState::Running,
            tolerance_ms: None,
            timestamp_ms: wall_clock_ms(),
        }
    }

    /// Set the declared topics.
    #[must_use]
    pub fn with_topics(
        mut self,
        publish_topic: Option<String>,
        subscribe_topic: Option<String>,
    ) -> Self {
        self.publish_topic = publish_topic;
        self.subscribe_topic = subscribe_topic;
        self
    }

    /// Set the lifecycle state.
    #[must_use]
    pub fn in_state(mut self, state: NodeState) -> Self {
        self.state = state;
        self
    }

    /// Set the staleness tolerance.
    #[must_use]
    pub fn with_tolerance_ms(mut self, tolerance_ms: u64) -> Self {
        self.tolerance_ms = Some(tolerance_ms);
        self
    }

    /// Override the emission timestamp (tests and replays).
    #[must_use]
    pub fn at(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }
}
