//! # Sink Delivery Boundary
//!
//! The collaborator seam for cloud-pushing sinks (object storage, stream
//! ingestion). The runtime core never retries deliveries itself - retry and
//! backoff policy belongs to the caller at this boundary - but every failure
//! is observable: returned to the caller and logged, never swallowed.

use crate::partition::PartitionRouter;
use async_trait::async_trait;
use msight_types::{registry, CodecError, Message};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Errors from pushing one record to a downstream cloud/HTTP/storage target.
#[derive(Debug, Error)]
pub enum SinkDeliveryError {
    /// Transport-level failure (connect, timeout, reset).
    #[error("Network error delivering to '{target}': {reason}")]
    Network { target: String, reason: String },

    /// Authentication or authorization failure.
    #[error("Auth failure delivering to '{target}': {reason}")]
    Auth { target: String, reason: String },

    /// Quota exhausted or throttled by the remote service.
    #[error("Throttled delivering to '{target}': {reason}")]
    Throttled { target: String, reason: String },

    /// The record could not be encoded for delivery.
    #[error(transparent)]
    Encode(#[from] CodecError),
}

/// Cloud sink collaborator: object storage, stream ingestion, HTTP endpoints.
///
/// `put` delivers one record under a partition key and returns the remote
/// acknowledgement (sequence number, ETag, or similar).
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Deliver one record.
    async fn put(
        &self,
        target: &str,
        bytes: Vec<u8>,
        partition_key: &str,
    ) -> Result<String, SinkDeliveryError>;
}

/// Combines a [`PartitionRouter`] with a [`DeliverySink`] for consume
/// implementations that push records downstream.
pub struct PartitionedDelivery {
    sink: Arc<dyn DeliverySink>,
    router: PartitionRouter,
    target: String,
}

impl PartitionedDelivery {
    /// Bind a sink and router to a delivery target (stream name, bucket, URL).
    #[must_use]
    pub fn new(sink: Arc<dyn DeliverySink>, router: PartitionRouter, target: impl Into<String>) -> Self {
        Self {
            sink,
            router,
            target: target.into(),
        }
    }

    /// Route and deliver one message in its wire form.
    ///
    /// The partition key is derived from the envelope only. Failures are
    /// logged with full context and returned for the caller's retry policy.
    pub async fn deliver(&self, message: &Message) -> Result<String, SinkDeliveryError> {
        let partition_key = self.router.key_for(&message.envelope);
        let bytes = registry::encode(message)?;

        match self.sink.put(&self.target, bytes, &partition_key).await {
            Ok(ack) => {
                debug!(
                    target = %self.target,
                    partition_key = %partition_key,
                    sensor = %message.envelope.sensor_name,
                    ack = %ack,
                    "Record delivered"
                );
                Ok(ack)
            }
            Err(e) => {
                error!(
                    target = %self.target,
                    partition_key = %partition_key,
                    sensor = %message.envelope.sensor_name,
                    error = %e,
                    "Record delivery failed"
                );
                Err(e)
            }
        }
    }
}
