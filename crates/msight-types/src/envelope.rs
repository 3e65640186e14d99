//! # Message Envelope
//!
//! The universal wrapper for every unit of data exchanged on a topic.
//!
//! A [`Message`] is an [`Envelope`] (type tag, provenance, capture time) plus
//! a concrete payload. Messages are immutable once handed to a publisher; the
//! runtime never persists them.

use crate::data::SensorData;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Common header carried by every message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Type tag resolved through the registry on the receiving side.
    pub type_name: String,
    /// Provenance: which sensor this data originated from.
    pub sensor_name: String,
    /// Wall-clock capture time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Monotonic capture reference, nanoseconds since process start.
    /// Not comparable across processes; intended for intra-process latency.
    pub monotonic_ns: u64,
}

/// The unit exchanged on a topic: envelope plus typed payload.
#[derive(Debug)]
pub struct Message {
    /// Common header.
    pub envelope: Envelope,
    /// The concrete payload.
    pub payload: Box<dyn SensorData>,
}

impl Message {
    /// Create a message, capturing both timestamps now.
    ///
    /// The envelope's `type_name` is taken from the payload; a node's
    /// publisher later enforces that it matches the topic's declared type.
    #[must_use]
    pub fn new(sensor_name: impl Into<String>, payload: Box<dyn SensorData>) -> Self {
        Self {
            envelope: Envelope {
                type_name: payload.type_name().to_string(),
                sensor_name: sensor_name.into(),
                timestamp_ms: wall_clock_ms(),
                monotonic_ns: monotonic_ns(),
            },
            payload,
        }
    }

    /// Borrow the payload as a concrete type, if it is one.
    #[must_use]
    pub fn payload_as<T: SensorData>(&self) -> Option<&T> {
        self.payload.as_any().downcast_ref::<T>()
    }
}

/// The self-describing wire form of a message.
///
/// The type tag is a leading field so receivers resolve the decoder before
/// touching the payload body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireMessage {
    pub type_name: String,
    pub sensor_name: String,
    pub timestamp_ms: u64,
    pub monotonic_ns: u64,
    pub payload: Vec<u8>,
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Nanoseconds since the first call in this process.
#[must_use]
pub fn monotonic_ns() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    let start = *START.get_or_init(Instant::now);
    start.elapsed().as_nanos() as u64
}
