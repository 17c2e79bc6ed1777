//! Error types for roaming links and terminus migration.

use super::TerminusState;
use crate::address::SceneId;
use crate::dispatch::HandlerError;
use crate::lock::LockError;
use crate::protocol::{CodecError, ErrorCode};
use crate::rpc::RpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoamingError {
    /// A terminus cannot be transferred to the scene already hosting it.
    #[error("Terminus already lives on scene {0}")]
    SameScene(SceneId),

    /// Another transfer is in progress or the terminus is gone.
    #[error("Terminus is {0:?}")]
    Busy(TerminusState),

    /// No link or terminus exists for the roaming type.
    #[error("No roaming link for type {0}")]
    NotFound(u32),

    #[error("Roaming type {0} is already linked")]
    AlreadyLinked(u32),

    /// The terminus was detached or replaced while an operation was suspended.
    #[error("Terminus moved while the call was in flight")]
    Moved,

    #[error("Failed to lock terminus id for type {roaming_type}: {source}")]
    LockTerminus {
        roaming_type: u32,
        #[source]
        source: RpcError,
    },

    #[error("Failed to unlock terminus id for type {roaming_type}")]
    UnlockTerminus { roaming_type: u32 },

    /// The destination refused or failed the hand-off.
    #[error("Terminus transfer failed: {0}")]
    Transfer(#[source] RpcError),

    /// No loader is registered for a transferred entity.
    #[error("No roaming entity loader for {0}")]
    UnknownEntityType(String),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl RoamingError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RoamingError::SameScene(_) => ErrorCode::TRANSFER_SAME_SCENE,
            RoamingError::Busy(_) => ErrorCode::TERMINUS_BUSY,
            RoamingError::NotFound(_) => ErrorCode::NOT_FOUND_ROAMING,
            RoamingError::AlreadyLinked(_) => ErrorCode::LINK_ROAMING_ALREADY_EXISTS,
            RoamingError::Moved | RoamingError::Lock(_) => ErrorCode::ROAMING_TIMEOUT,
            RoamingError::LockTerminus { .. } => ErrorCode::LOCK_TERMINUS_ID,
            RoamingError::UnlockTerminus { .. } => ErrorCode::UNLOCK_TERMINUS_ID,
            RoamingError::Transfer(RpcError::Remote(code)) => *code,
            RoamingError::Transfer(_) | RoamingError::UnknownEntityType(_) => ErrorCode::TERMINUS_START_TRANSFER,
            RoamingError::Rpc(e) => e.code(),
            RoamingError::Codec(_) => ErrorCode::RPC_FAIL,
        }
    }
}

impl From<RoamingError> for HandlerError {
    fn from(e: RoamingError) -> Self {
        HandlerError::Rejected(e.code())
    }
}
