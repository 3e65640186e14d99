//! # MSight Bus - Topic Pub/Sub for Node Processes
//!
//! Thin wrapper over the broker transport giving every node the same three
//! primitives per named topic: publish, subscribe, heartbeat.
//!
//! ## Contract
//!
//! - At-least-once delivery; FIFO from a single publisher, no ordering
//!   guarantee across independent publishers to the same topic.
//! - A slow subscriber falls behind the topic's retained history and loses
//!   the oldest entries; lag is logged, never an error.
//! - All publishers to a topic must agree on its payload type; the
//!   [`TopicPublisher`] enforces the declared type per node.

pub mod broker;
pub mod client;
pub mod heartbeat;

// Re-export main types
pub use broker::{Broker, BusError, InMemoryBroker, RawSubscription};
pub use client::{TopicPublisher, TopicSubscription};
pub use heartbeat::HeartbeatRecord;

/// Maximum wire messages buffered per topic before subscribers lag.
pub const DEFAULT_TOPIC_CAPACITY: usize = 1024;
