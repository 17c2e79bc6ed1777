//! In-band status codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status carried by every response. Zero means success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    pub const OK: ErrorCode = ErrorCode(0);

    /// A local handler failed while a reply was owed.
    pub const RPC_FAIL: ErrorCode = ErrorCode(100_000_002);
    /// The target address could not be resolved to a live entity or scene.
    pub const NOT_FOUND_ROUTE: ErrorCode = ErrorCode(100_000_003);
    /// No response arrived before the call timeout.
    pub const ROUTE_TIMEOUT: ErrorCode = ErrorCode(100_000_004);
    /// The entity changed or vanished while the request waited for it.
    pub const ENTITY_NOT_FOUND: ErrorCode = ErrorCode(100_000_008);

    pub const ADDRESSABLE_NOT_FOUND: ErrorCode = ErrorCode(100_000_010);
    pub const LOCK_ADDRESSABLE: ErrorCode = ErrorCode(100_000_011);
    pub const UNLOCK_ADDRESSABLE: ErrorCode = ErrorCode(100_000_012);

    pub const NOT_FOUND_ROAMING: ErrorCode = ErrorCode(100_000_020);
    pub const ROAMING_TIMEOUT: ErrorCode = ErrorCode(100_000_021);
    pub const LINK_ROAMING_ALREADY_EXISTS: ErrorCode = ErrorCode(100_000_022);
    pub const LOCK_TERMINUS_ID: ErrorCode = ErrorCode(100_000_023);
    pub const UNLOCK_TERMINUS_ID: ErrorCode = ErrorCode(100_000_024);
    pub const TERMINUS_START_TRANSFER: ErrorCode = ErrorCode(100_000_025);
    pub const TERMINUS_BUSY: ErrorCode = ErrorCode(100_000_026);
    pub const TRANSFER_SAME_SCENE: ErrorCode = ErrorCode(100_000_027);

    pub const SCENE_DISPOSED: ErrorCode = ErrorCode(100_000_030);

    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// Routing failures that a retry loop may recover from.
    pub const fn is_route_miss(self) -> bool {
        self.0 == Self::NOT_FOUND_ROUTE.0 || self.0 == Self::NOT_FOUND_ROAMING.0
    }

    /// Timeouts are surfaced to the caller and never retried here.
    pub const fn is_timeout(self) -> bool {
        self.0 == Self::ROUTE_TIMEOUT.0 || self.0 == Self::ROAMING_TIMEOUT.0
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::OK => "Ok",
            Self::RPC_FAIL => "RpcFail",
            Self::NOT_FOUND_ROUTE => "NotFoundRoute",
            Self::ROUTE_TIMEOUT => "RouteTimeout",
            Self::ENTITY_NOT_FOUND => "EntityNotFound",
            Self::ADDRESSABLE_NOT_FOUND => "AddressableNotFound",
            Self::LOCK_ADDRESSABLE => "LockAddressable",
            Self::UNLOCK_ADDRESSABLE => "UnLockAddressable",
            Self::NOT_FOUND_ROAMING => "NotFoundRoaming",
            Self::ROAMING_TIMEOUT => "RoamingTimeout",
            Self::LINK_ROAMING_ALREADY_EXISTS => "LinkRoamingAlreadyExists",
            Self::LOCK_TERMINUS_ID => "LockTerminusId",
            Self::UNLOCK_TERMINUS_ID => "UnLockTerminusId",
            Self::TERMINUS_START_TRANSFER => "TerminusStartTransfer",
            Self::TERMINUS_BUSY => "TerminusBusy",
            Self::TRANSFER_SAME_SCENE => "TransferSameScene",
            Self::SCENE_DISPOSED => "SceneDisposed",
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}({})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classes() {
        assert!(ErrorCode::NOT_FOUND_ROUTE.is_route_miss());
        assert!(ErrorCode::NOT_FOUND_ROAMING.is_route_miss());
        assert!(!ErrorCode::ROUTE_TIMEOUT.is_route_miss());
        assert!(ErrorCode::ROAMING_TIMEOUT.is_timeout());
        assert!(ErrorCode::OK.is_ok());
    }

    #[test]
    fn display_names_known_codes() {
        assert_eq!(ErrorCode::RPC_FAIL.to_string(), "RpcFail(100000002)");
        assert_eq!(ErrorCode(42).to_string(), "42");
    }
}
