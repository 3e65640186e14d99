//! # MSight Types Crate
//!
//! This crate contains the wire-level data model shared by every MSight node
//! process: the message envelope, the built-in sensor-data payload types, the
//! process-wide type registry, and validated node configuration.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-node types are defined here.
//! - **Self-Describing Wire Form**: Every encoded message carries its type
//!   tag so any process with the right registration can decode it.
//! - **Registration Happens-Before Decode**: Payload types MUST be registered
//!   in a process before the first message of that type is decoded there.

pub mod config;
pub mod data;
pub mod envelope;
pub mod errors;
pub mod registry;

pub use config::{NodeConfig, NodeKind, PartitionConfig, PartitionMode};
pub use data::{BytesData, ImageData, SensorData, VideoData};
pub use envelope::{Envelope, Message};
pub use errors::{CodecError, ConfigError, NodeState};
pub use registry::{decode, encode, register, register_builtin_types, register_payload};
