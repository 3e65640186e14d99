//! # MSight Runtime - Node Lifecycle Engine and Policies
//!
//! The execution core shared by every MSight node kind. A node supplies a
//! behavior (one of the capability traits in [`node`]); the engine drives the
//! common lifecycle around it:
//!
//! ```text
//! Created → Initializing → Running → Draining → Stopped
//!                │             │
//!                └──── any ────┴──→ Errored (terminal)
//! ```
//!
//! ## Node Kinds
//!
//! - **Source** ([`node::Produce`]): the engine periodically invokes a
//!   "produce one item" callback and publishes the result.
//! - **ServerSource** ([`node::Serve`]): a blocking `serve` hook owns an
//!   external server; worker threads hand raw units to the engine through a
//!   thread-safe [`node::IncomingHandle`].
//! - **Processor** ([`node::Process`]): consume, transform, re-publish.
//! - **Sink** ([`node::Consume`]): consume only.
//!
//! ## Policies
//!
//! Every produced/received item passes the gap-based [`rate::RateController`]
//! before publish. Running nodes emit liveness records on a fixed interval
//! ([`heartbeat`]); cloud-pushing sinks assign partition keys through the
//! [`partition::PartitionRouter`].
//!
//! ## Error Isolation
//!
//! A failing user callback drops that one message and the loop continues;
//! only configuration errors and a failing `serve` hook are fatal to a node.

pub mod engine;
pub mod error;
pub mod heartbeat;
pub mod node;
pub mod partition;
pub mod rate;
pub mod sink;

// Re-export main types
pub use engine::{NodeBehavior, NodeEngine, ShutdownHandle};
pub use error::NodeError;
pub use heartbeat::{status_report, status_report_json, Liveness, NodeStatus};
pub use node::{Consume, IncomingHandle, Process, Produce, Serve, ShutdownSignal};
pub use partition::PartitionRouter;
pub use rate::RateController;
pub use sink::{DeliverySink, PartitionedDelivery, SinkDeliveryError};
