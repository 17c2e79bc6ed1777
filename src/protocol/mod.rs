//! # Wire Protocol
//!
//! The types that cross scene boundaries:
//!
//! - [`Frame`]: the envelope handed over by the transport (opcode, rpc id, address, payload).
//! - [`Message`], [`Request`], [`Response`]: traits tying a Rust type to its opcode and,
//!   for requests, to the response shape the caller expects.
//! - [`ErrorCode`]: the in-band status every response carries.
//! - [`Codec`]: the payload encoding seam, with [`JsonCodec`] as the default.
//! - [`messages`]: the runtime's own directory and roaming messages.

pub mod codec;
pub mod error;
pub mod error_code;
pub mod frame;
pub mod message;
pub mod messages;

pub use codec::*;
pub use error::*;
pub use error_code::*;
pub use frame::*;
pub use message::*;
