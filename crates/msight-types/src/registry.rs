//! # Type Registry
//!
//! Maps wire-level type tags to payload decoders, process-wide.
//!
//! ## Initialization Contract
//!
//! Registration is explicit runtime state, not an import-time side effect:
//! every process that decodes messages of a type MUST call [`register`] (or
//! the typed helper [`register_payload`]) for that type before its first
//! decode. [`register_builtin_types`] covers the built-in payloads and is
//! safe to call more than once.

use crate::data::{BytesData, ImageData, SensorData, VideoData};
use crate::envelope::{Envelope, Message, WireMessage};
use crate::errors::CodecError;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

/// A decoder turns a payload body into a concrete [`SensorData`] box.
pub type DecoderFn = fn(&[u8]) -> Result<Box<dyn SensorData>, CodecError>;

/// One registered tag: the decoder, plus the payload's `TypeId` for typed
/// registrations. Idempotence checks prefer the `TypeId` - the same generic
/// instantiation can get distinct function addresses across codegen units,
/// so pointer identity alone is not reliable.
struct RegisteredDecoder {
    decoder: DecoderFn,
    payload_type: Option<TypeId>,
}

fn registry() -> &'static RwLock<HashMap<String, RegisteredDecoder>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, RegisteredDecoder>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register a decoder for a type tag.
///
/// Idempotent for the same decoder. Registering an existing tag with a
/// different decoder is a configuration error and fails here, at
/// registration time, rather than surfacing as garbled payloads at decode
/// time. Prefer [`register_payload`], whose idempotence is keyed on the
/// payload type rather than the decoder's address.
pub fn register(type_name: &str, decoder: DecoderFn) -> Result<(), CodecError> {
    register_entry(type_name, decoder, None)
}

/// Register a serde-decodable payload type under a tag.
///
/// Idempotent per payload type: re-registering the same `T` under the same
/// tag is a no-op, from any crate in the process.
pub fn register_payload<T>(type_name: &str) -> Result<(), CodecError>
where
    T: SensorData + DeserializeOwned,
{
    register_entry(type_name, decode_body::<T>, Some(TypeId::of::<T>()))
}

fn register_entry(
    type_name: &str,
    decoder: DecoderFn,
    payload_type: Option<TypeId>,
) -> Result<(), CodecError> {
    let mut map = registry().write();
    if let Some(existing) = map.get(type_name) {
        let same_payload = existing.payload_type.is_some() && existing.payload_type == payload_type;
        if same_payload || existing.decoder as usize == decoder as usize {
            return Ok(());
        }
        return Err(CodecError::DuplicateRegistration {
            type_name: type_name.to_string(),
        });
    }
    debug!(type_name, "Registered payload type");
    map.insert(
        type_name.to_string(),
        RegisteredDecoder {
            decoder,
            payload_type,
        },
    );
    Ok(())
}

fn decode_body<T>(bytes: &[u8]) -> Result<Box<dyn SensorData>, CodecError>
where
    T: SensorData + DeserializeOwned,
{
    let payload: T = bincode::deserialize(bytes).map_err(|e| CodecError::Decode {
        type_name: std::any::type_name::<T>().to_string(),
        reason: e.to_string(),
    })?;
    Ok(Box::new(payload))
}

/// Register the built-in payload types (bytes, image, video).
///
/// Every node process calls this during startup; repeated calls are no-ops.
pub fn register_builtin_types() -> Result<(), CodecError> {
    register_payload::<BytesData>(BytesData::TYPE_NAME)?;
    register_payload::<ImageData>(ImageData::TYPE_NAME)?;
    register_payload::<VideoData>(VideoData::TYPE_NAME)?;
    Ok(())
}

/// Serialize a message into its self-describing wire form.
pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    let wire = WireMessage {
        type_name: message.envelope.type_name.clone(),
        sensor_name: message.envelope.sensor_name.clone(),
        timestamp_ms: message.envelope.timestamp_ms,
        monotonic_ns: message.envelope.monotonic_ns,
        payload: message.payload.encode_payload()?,
    };
    bincode::serialize(&wire).map_err(|e| CodecError::Encode {
        type_name: wire.type_name.clone(),
        reason: e.to_string(),
    })
}

/// Deserialize wire bytes back into a typed message.
///
/// Reads the type tag first and fails with [`CodecError::UnknownType`] if no
/// decoder is registered; the failure is deterministic and leaves the
/// registry untouched, so subsequent decodes are unaffected.
pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
    let wire: WireMessage = bincode::deserialize(bytes).map_err(|e| CodecError::Decode {
        type_name: "<envelope>".to_string(),
        reason: e.to_string(),
    })?;

    let decoder = {
        let map = registry().read();
        map.get(&wire.type_name).map(|entry| entry.decoder)
    };
    let Some(decoder) = decoder else {
        return Err(CodecError::UnknownType {
            type_name: wire.type_name,
        });
    };

    let payload = decoder(&wire.payload)?;
    Ok(Message {
        envelope: Envelope {
            type_name: wire.type_name,
            sensor_name: wire.sensor_name,
            timestamp_ms: wire.timestamp_ms,
            monotonic_ns: wire.monotonic_ns,
        },
        payload,
    })
}
