//! Error types for RPC calls.

use crate::address::Address;
use crate::protocol::{CodecError, ErrorCode};
use crate::scene::NetworkError;
use thiserror::Error;

/// Why a call did not produce a successful response.
#[derive(Debug, Error)]
pub enum RpcError {
    /// No response arrived in time. The pending record is gone.
    #[error("Rpc {rpc_id} to {target} timed out")]
    Timeout { rpc_id: u32, target: Address },

    /// The calling scene was torn down while the call was pending.
    #[error("Scene disposed while rpc {0} was pending")]
    Disposed(u32),

    /// The request could not be routed towards its target.
    #[error("Cannot route to {target}: {source}")]
    Unroutable {
        target: Address,
        #[source]
        source: NetworkError,
    },

    /// The response arrived and carries a non-zero error code.
    #[error("Remote error {0}")]
    Remote(ErrorCode),

    /// The response arrived with an opcode other than the expected one.
    #[error("Unexpected response opcode {actual}, expected {expected}")]
    UnexpectedResponse {
        expected: crate::opcode::OpCode,
        actual: crate::opcode::OpCode,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl RpcError {
    /// The wire status equivalent to this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            RpcError::Timeout { .. } => ErrorCode::ROUTE_TIMEOUT,
            RpcError::Disposed(_) => ErrorCode::SCENE_DISPOSED,
            RpcError::Unroutable { .. } => ErrorCode::NOT_FOUND_ROUTE,
            RpcError::Remote(code) => *code,
            RpcError::UnexpectedResponse { .. } | RpcError::Codec(_) => ErrorCode::RPC_FAIL,
        }
    }
}
