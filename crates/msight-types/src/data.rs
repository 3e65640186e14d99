//! # Sensor Data Payloads
//!
//! The [`SensorData`] trait is the contract every payload type fulfills, plus
//! the built-in payloads the runtime ships with: raw bytes, decoded images,
//! and encoded video segments with a JSON sidecar.
//!
//! Custom payloads implement [`SensorData`] and register a decoder through
//! [`crate::registry::register_payload`] before any process decodes them.

use crate::errors::CodecError;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// Contract for a concrete payload type carried inside a [`crate::Message`].
///
/// Implementations are plain serde structs; `encode_payload` produces the
/// bincode body that travels inside the wire envelope.
pub trait SensorData: fmt::Debug + Send + Sync + 'static {
    /// The type tag carried on the wire and resolved by the registry.
    fn type_name(&self) -> &'static str;

    /// Serialize the payload body (envelope fields excluded).
    fn encode_payload(&self) -> Result<Vec<u8>, CodecError>;

    /// Downcast hook for consumers that know the concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// Serialize a payload body with bincode, mapping failures to [`CodecError`].
///
/// Custom payload types use this from their `encode_payload` implementation.
pub fn encode_body<T: Serialize + SensorData>(value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(value).map_err(|e| CodecError::Encode {
        type_name: value.type_name().to_string(),
        reason: e.to_string(),
    })
}

/// Raw, uninterpreted bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytesData {
    /// The raw payload.
    pub data: Vec<u8>,
}

impl BytesData {
    /// Registered type tag.
    pub const TYPE_NAME: &'static str = "bytes";

    /// Create a bytes payload.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl SensorData for BytesData {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn encode_payload(&self) -> Result<Vec<u8>, CodecError> {
        encode_body(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel layout, e.g. `"rgb8"` or `"bgr8"`.
    pub pixel_format: String,
    /// Row-major pixel bytes.
    pub data: Vec<u8>,
}

impl ImageData {
    /// Registered type tag.
    pub const TYPE_NAME: &'static str = "image";
}

impl SensorData for ImageData {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn encode_payload(&self) -> Result<Vec<u8>, CodecError> {
        encode_body(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An encoded video segment plus its JSON sidecar metadata.
///
/// The runtime treats both fields as opaque; codecs and perception plugins
/// interpret them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoData {
    /// Encoded video bytes (codec-specific).
    pub data: Vec<u8>,
    /// Sidecar metadata, e.g. codec parameters or per-frame annotations.
    pub metadata: serde_json::Value,
}

impl VideoData {
    /// Registered type tag.
    pub const TYPE_NAME: &'static str = "video";

    /// Create a video payload with empty metadata.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            metadata: serde_json::Value::Null,
        }
    }
}

impl SensorData for VideoData {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn encode_payload(&self) -> Result<Vec<u8>, CodecError> {
        encode_body(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
