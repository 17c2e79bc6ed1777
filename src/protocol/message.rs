//! Message traits.
//!
//! A message type declares its opcode once; everything else (registry entries, handler
//! bindings, failure responses) is derived from that declaration at registration time.

use super::{Codec, CodecError, ErrorCode, JsonCodec};
use crate::opcode::OpCode;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

/// A value that travels in a [`Frame`](super::Frame) payload.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    const OPCODE: OpCode;

    /// Route type used by custom-route and roaming messages to pick a target on the gate.
    const ROUTE_TYPE: u32 = 0;

    fn encode(&self) -> Result<Bytes, CodecError> {
        JsonCodec.encode(self)
    }

    fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        JsonCodec.decode(payload)
    }
}

/// A message that expects exactly one reply.
pub trait Request: Message {
    type Response: Response;
}

/// A reply. `Default` gives the shape used for failure responses.
pub trait Response: Message + Default {
    fn error_code(&self) -> ErrorCode;
    fn set_error_code(&mut self, code: ErrorCode);

    /// A response of this type carrying only `code`.
    fn failure(code: ErrorCode) -> Self {
        let mut response = Self::default();
        response.set_error_code(code);
        response
    }
}

/// Implements [`Message`] for a type with a fixed opcode.
///
/// ```rust,ignore
/// message!(ChatMessage => CHAT_MESSAGE);
/// message!(MoveRequest => MOVE_REQUEST, route = 2);
/// ```
#[macro_export]
macro_rules! message {
    ($ty:ty => $opcode:expr) => {
        impl $crate::protocol::Message for $ty {
            const OPCODE: $crate::opcode::OpCode = $opcode;
        }
    };
    ($ty:ty => $opcode:expr, route = $route:expr) => {
        impl $crate::protocol::Message for $ty {
            const OPCODE: $crate::opcode::OpCode = $opcode;
            const ROUTE_TYPE: u32 = $route;
        }
    };
}

/// Implements [`Message`] and [`Request`] for a request type.
#[macro_export]
macro_rules! request {
    ($ty:ty => $opcode:expr, response = $response:ty) => {
        $crate::message!($ty => $opcode);
        impl $crate::protocol::Request for $ty {
            type Response = $response;
        }
    };
    ($ty:ty => $opcode:expr, response = $response:ty, route = $route:expr) => {
        $crate::message!($ty => $opcode, route = $route);
        impl $crate::protocol::Request for $ty {
            type Response = $response;
        }
    };
}

/// Implements [`Message`] and [`Response`] for a type with an `error_code: ErrorCode` field.
#[macro_export]
macro_rules! response {
    ($ty:ty => $opcode:expr) => {
        $crate::message!($ty => $opcode);
        impl $crate::protocol::Response for $ty {
            fn error_code(&self) -> $crate::protocol::ErrorCode {
                self.error_code
            }
            fn set_error_code(&mut self, code: $crate::protocol::ErrorCode) {
                self.error_code = code;
            }
        }
    };
}
