use crate::lock::LockError;
use crate::protocol::{CodecError, ErrorCode};
use crate::rpc::RpcError;
use thiserror::Error;

/// Why a handler did not produce a result. Converted into a failure response at the
/// dispatch boundary.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler refused the message with an explicit wire code.
    #[error("Rejected with {0}")]
    Rejected(ErrorCode),

    /// The routed entity is not of the type the handler was registered for.
    #[error("Entity is not a {expected}")]
    EntityMismatch { expected: &'static str },

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A nested call made by the handler failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }

    /// The code carried by the failure response.
    pub fn code(&self) -> ErrorCode {
        match self {
            HandlerError::Rejected(code) => *code,
            HandlerError::EntityMismatch { .. } => ErrorCode::ENTITY_NOT_FOUND,
            HandlerError::Rpc(e) => e.code(),
            HandlerError::Failed(_) | HandlerError::Codec(_) | HandlerError::Lock(_) => ErrorCode::RPC_FAIL,
        }
    }
}

impl From<ErrorCode> for HandlerError {
    fn from(code: ErrorCode) -> Self {
        HandlerError::Rejected(code)
    }
}
