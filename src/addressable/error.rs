//! Error types for the addressable directory.

use crate::dispatch::HandlerError;
use crate::lock::LockError;
use crate::protocol::{CodecError, ErrorCode};
use crate::rpc::RpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddressableError {
    /// The directory has no owner for the key.
    #[error("Addressable {0} not found")]
    NotFound(i64),

    /// Waiting for the key's lock failed.
    #[error("Failed to lock addressable {key}: {source}")]
    Lock {
        key: i64,
        #[source]
        source: LockError,
    },

    /// `unlock` was called for a key that is not locked.
    #[error("Addressable {0} is not locked")]
    NotLocked(i64),

    /// No directory scenes are configured.
    #[error("No addressable scenes configured")]
    NoDirectory,

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl AddressableError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AddressableError::NotFound(_) => ErrorCode::ADDRESSABLE_NOT_FOUND,
            AddressableError::Lock { .. } => ErrorCode::LOCK_ADDRESSABLE,
            AddressableError::NotLocked(_) => ErrorCode::UNLOCK_ADDRESSABLE,
            AddressableError::NoDirectory => ErrorCode::NOT_FOUND_ROUTE,
            AddressableError::Rpc(e) => e.code(),
            AddressableError::Codec(_) => ErrorCode::RPC_FAIL,
        }
    }
}

impl From<AddressableError> for HandlerError {
    fn from(e: AddressableError) -> Self {
        match e {
            AddressableError::Rpc(e) => HandlerError::Rpc(e),
            other => HandlerError::Rejected(other.code()),
        }
    }
}
