//! Error types for payload encoding.

use thiserror::Error;

/// Errors raised by a [`Codec`](super::Codec).
#[derive(Debug, Error)]
pub enum CodecError {
    /// The value could not be encoded.
    #[error("Encode failed for {type_name}: {source}")]
    Encode {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The payload could not be decoded into the requested type.
    #[error("Decode failed for {type_name}: {source}")]
    Decode {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
