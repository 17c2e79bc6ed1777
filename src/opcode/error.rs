//! Error types for opcode classification.

use thiserror::Error;

/// A frame whose opcode cannot be classified. Fatal for the originating connection only.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    /// The protocol field holds a value outside the classification table.
    #[error("Unknown protocol type: {0}")]
    UnknownProtocolType(u32),

    /// A client sent an opcode reserved for traffic between scenes.
    #[error("Inner opcode {0} received on an outer session")]
    InnerOpCodeFromClient(u32),

    /// A client sent a response; only scenes answer calls.
    #[error("Response opcode {0} received on an outer session")]
    ResponseFromClient(u32),
}
