//! # Topic Client
//!
//! Typed publish/subscribe handles bound to one named topic.
//!
//! The publisher enforces the topic's declared payload type: a node declares
//! the type once at construction and every message it publishes must match.
//! The subscription decodes through the type registry and isolates bad
//! messages instead of tearing the node down.

use crate::broker::{Broker, BusError, RawSubscription};
use msight_types::{registry, CodecError, Message};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Publishing handle for one topic with a declared payload type.
pub struct TopicPublisher {
    broker: Arc<dyn Broker>,
    topic: String,
    /// The payload type every message on this handle must carry.
    data_type: String,
    /// Messages accepted and handed to the broker.
    published: AtomicU64,
}

impl TopicPublisher {
    /// Bind a publisher to a topic, declaring its payload type.
    #[must_use]
    pub fn new(
        broker: Arc<dyn Broker>,
        topic: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            topic: topic.into(),
            data_type: data_type.into(),
            published: AtomicU64::new(0),
        }
    }

    /// The topic name.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The declared payload type.
    #[must_use]
    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    /// Messages accepted so far.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Encode and publish one message.
    ///
    /// # Returns
    ///
    /// The number of subscribers that received it.
    ///
    /// # Errors
    ///
    /// [`BusError::TypeMismatch`] if the message's type tag differs from the
    /// declared payload type; codec errors if encoding fails.
    pub async fn publish(&self, message: &Message) -> Result<usize, BusError> {
        if message.envelope.type_name != self.data_type {
            return Err(BusError::TypeMismatch {
                topic: self.topic.clone(),
                expected: self.data_type.clone(),
                actual: message.envelope.type_name.clone(),
            });
        }

        let bytes = registry::encode(message)?;
        let receivers = self.broker.publish(&self.topic, bytes).await?;
        self.published.fetch_add(1, Ordering::Relaxed);
        debug!(
            topic = %self.topic,
            sensor = %message.envelope.sensor_name,
            receivers,
            "Published message"
        );
        Ok(receivers)
    }
}

/// Receiving handle for one topic.
pub struct TopicSubscription {
    topic: String,
    inner: Box<dyn RawSubscription>,
}

impl TopicSubscription {
    /// Open a subscription on a topic.
    #[must_use]
    pub fn new(broker: &dyn Broker, topic: impl Into<String>) -> Self {
        let topic = topic.into();
        let inner = broker.subscribe(&topic);
        Self { topic, inner }
    }

    /// The topic name.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receive the next raw wire message, or `None` once the broker closes.
    pub async fn recv_bytes(&mut self) -> Option<Vec<u8>> {
        self.inner.recv().await
    }

    /// Receive and decode the next message.
    ///
    /// Messages that fail to decode (unknown type tag, corrupt body) are
    /// dropped and logged; the subscription keeps going. Returns `None` only
    /// when the broker closes.
    pub async fn recv_message(&mut self) -> Option<Message> {
        loop {
            let bytes = self.inner.recv().await?;
            match registry::decode(&bytes) {
                Ok(message) => return Some(message),
                Err(CodecError::UnknownType { type_name }) => {
                    warn!(
                        topic = %self.topic,
                        type_name,
                        "Dropped message with unregistered type"
                    );
                }
                Err(e) => {
                    warn!(topic = %self.topic, error = %e, "Dropped undecodable message");
                }
            }
        }
    }
}
