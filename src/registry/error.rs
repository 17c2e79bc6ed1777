//! Error types for the type and handler registries.

use crate::opcode::OpCode;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    /// Opcode zero never identifies a message type.
    #[error("Opcode 0 cannot be resolved")]
    ZeroOpCode,

    /// No type is registered for the opcode.
    #[error("Unknown opcode: {0}")]
    UnknownOpCode(OpCode),

    /// Two different types claim the same opcode.
    #[error("Opcode {opcode} already used by {existing}, cannot register {incoming}")]
    DuplicateOpCode {
        opcode: OpCode,
        existing: &'static str,
        incoming: &'static str,
    },

    /// A second handler was registered for an opcode that allows only one.
    #[error("Handler already registered for opcode {0}")]
    DuplicateHandler(OpCode),
}
