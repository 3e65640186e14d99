//! # Broker Transport
//!
//! The seam between the runtime and whatever actually moves bytes between
//! node processes. The runtime only requires topic publish/subscribe plus a
//! lightweight key-value surface for the heartbeat table.

use crate::heartbeat::HeartbeatRecord;
use crate::DEFAULT_TOPIC_CAPACITY;
use async_trait::async_trait;
use msight_types::CodecError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Errors from bus operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// The broker was shut down.
    #[error("Topic '{topic}': broker closed")]
    Closed { topic: String },

    /// A publisher tried to send a payload type other than the topic's
    /// declared one.
    #[error("Topic '{topic}' expects payload type '{expected}', got '{actual}'")]
    TypeMismatch {
        topic: String,
        expected: String,
        actual: String,
    },

    /// Encoding or decoding through the type registry failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Receiving end of one topic subscription, transport-specific.
#[async_trait]
pub trait RawSubscription: Send {
    /// Receive the next wire message.
    ///
    /// Returns `None` once the broker is closed. Implementations skip over
    /// transport-level lag internally.
    async fn recv(&mut self) -> Option<Vec<u8>>;
}

/// Broker transport collaborator.
///
/// Must provide at-least-once topic fan-out and a key-value primitive for the
/// heartbeat table with snapshot-read semantics.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish wire bytes to a named topic.
    ///
    /// # Returns
    ///
    /// The number of active subscribers that received the message.
    async fn publish(&self, topic: &str, bytes: Vec<u8>) -> Result<usize, BusError>;

    /// Open a subscription to a named topic.
    fn subscribe(&self, topic: &str) -> Box<dyn RawSubscription>;

    /// Record a node's most recent liveness record, replacing any previous one.
    fn record_heartbeat(&self, record: HeartbeatRecord);

    /// Point-in-time snapshot of the most recent record per node name.
    fn heartbeat_snapshot(&self) -> Vec<HeartbeatRecord>;
}

/// In-memory broker for single-process deployments and tests.
///
/// Uses one `tokio::sync::broadcast` channel per topic; topics are created
/// lazily on first publish or subscribe. Distributed deployments would
/// implement [`Broker`] over a real transport (e.g. Redis, Kafka) instead.
pub struct InMemoryBroker {
    /// Per-topic broadcast senders.
    topics: RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>,

    /// Most recent liveness record per node name.
    heartbeats: RwLock<HashMap<String, HeartbeatRecord>>,

    /// Total messages published across all topics.
    messages_published: AtomicU64,

    /// Per-topic channel capacity.
    capacity: usize,
}

impl InMemoryBroker {
    /// Create a broker with the default per-topic capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// Create a broker with a specific per-topic capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            heartbeats: RwLock::new(HashMap::new()),
            messages_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Total messages published across all topics.
    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }

    /// Number of active subscribers on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        if let Some(sender) = self.topics.read().get(topic) {
            return sender.clone();
        }
        let mut topics = self.topics.write();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| {
                debug!(topic, "Topic created");
                broadcast::channel(self.capacity).0
            })
            .clone()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, topic: &str, bytes: Vec<u8>) -> Result<usize, BusError> {
        let sender = self.sender_for(topic);
        self.messages_published.fetch_add(1, Ordering::Relaxed);

        match sender.send(bytes) {
            Ok(receivers) => {
                debug!(topic, receivers, "Message published");
                Ok(receivers)
            }
            Err(_) => {
                // No receivers yet - the message is dropped, not an error.
                warn!(topic, "Message dropped (no subscribers)");
                Ok(0)
            }
        }
    }

    fn subscribe(&self, topic: &str) -> Box<dyn RawSubscription> {
        let receiver = self.sender_for(topic).subscribe();
        debug!(topic, "Subscription opened");
        Box::new(BroadcastSubscription {
            topic: topic.to_string(),
            receiver,
        })
    }

    fn record_heartbeat(&self, record: HeartbeatRecord) {
        self.heartbeats.write().insert(record.node.clone(), record);
    }

    fn heartbeat_snapshot(&self) -> Vec<HeartbeatRecord> {
        self.heartbeats.read().values().cloned().collect()
    }
}

/// Subscription backed by a broadcast receiver.
struct BroadcastSubscription {
    topic: String,
    receiver: broadcast::Receiver<Vec<u8>>,
}

#[async_trait]
impl RawSubscription for BroadcastSubscription {
    async fn recv(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.receiver.recv().await {
                Ok(bytes) => return Some(bytes),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(topic = %self.topic, lagged = count, "Subscriber lagged, oldest messages dropped");
                    continue;
                }
            }
        }
    }
}
