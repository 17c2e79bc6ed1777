//! Payload codec seam.

use super::CodecError;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

/// Turns message values into payload bytes and back.
pub trait Codec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, CodecError>;
    fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CodecError>;
}

/// JSON payloads via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, CodecError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|source| CodecError::Encode {
                type_name: std::any::type_name::<T>(),
                source,
            })
    }

    fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(payload).map_err(|source| CodecError::Decode {
            type_name: std::any::type_name::<T>(),
            source,
        })
    }
}
