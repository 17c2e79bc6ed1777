//! Opcodes reserved by the runtime itself.
//!
//! Application protocols must not reuse these (protocol, index) pairs.

use super::{OpCode, OpCodeType, PackFormat};

const fn op(pack: PackFormat, protocol: OpCodeType, index: u32) -> OpCode {
    OpCode::new(pack, protocol, index)
}

use OpCodeType::*;
use PackFormat::{Json, ProtoBuf};

pub const PING_REQUEST: OpCode = op(ProtoBuf, OuterPingRequest, 1);
pub const PING_RESPONSE: OpCode = op(ProtoBuf, OuterPingResponse, 1);

/// Fallback failure response for direct-scope requests.
pub const DEFAULT_RESPONSE: OpCode = op(ProtoBuf, InnerResponse, 1);
/// Fallback failure response for address-scoped requests.
pub const ROUTE_RESPONSE: OpCode = op(ProtoBuf, InnerAddressResponse, 7);

pub const ADDRESSABLE_ADD_REQUEST: OpCode = op(ProtoBuf, InnerAddressRequest, 1);
pub const ADDRESSABLE_ADD_RESPONSE: OpCode = op(ProtoBuf, InnerAddressResponse, 1);
pub const ADDRESSABLE_GET_REQUEST: OpCode = op(ProtoBuf, InnerAddressRequest, 2);
pub const ADDRESSABLE_GET_RESPONSE: OpCode = op(ProtoBuf, InnerAddressResponse, 2);
pub const ADDRESSABLE_REMOVE_REQUEST: OpCode = op(ProtoBuf, InnerAddressRequest, 3);
pub const ADDRESSABLE_REMOVE_RESPONSE: OpCode = op(ProtoBuf, InnerAddressResponse, 3);
pub const ADDRESSABLE_LOCK_REQUEST: OpCode = op(ProtoBuf, InnerAddressRequest, 4);
pub const ADDRESSABLE_LOCK_RESPONSE: OpCode = op(ProtoBuf, InnerAddressResponse, 4);
pub const ADDRESSABLE_UNLOCK_REQUEST: OpCode = op(ProtoBuf, InnerAddressRequest, 5);
pub const ADDRESSABLE_UNLOCK_RESPONSE: OpCode = op(ProtoBuf, InnerAddressResponse, 5);

pub const LINK_ROAMING_REQUEST: OpCode = op(Json, InnerAddressRequest, 6);
pub const LINK_ROAMING_RESPONSE: OpCode = op(Json, InnerAddressResponse, 6);
pub const UNLINK_ROAMING_REQUEST: OpCode = op(ProtoBuf, InnerAddressRequest, 8);
pub const UNLINK_ROAMING_RESPONSE: OpCode = op(ProtoBuf, InnerAddressResponse, 8);
pub const LOCK_TERMINUS_ID_REQUEST: OpCode = op(ProtoBuf, InnerAddressRequest, 9);
pub const LOCK_TERMINUS_ID_RESPONSE: OpCode = op(ProtoBuf, InnerAddressResponse, 9);
pub const UNLOCK_TERMINUS_ID_REQUEST: OpCode = op(ProtoBuf, InnerAddressRequest, 10);
pub const UNLOCK_TERMINUS_ID_RESPONSE: OpCode = op(ProtoBuf, InnerAddressResponse, 10);
pub const GET_TERMINUS_ID_REQUEST: OpCode = op(ProtoBuf, InnerAddressRequest, 11);
pub const GET_TERMINUS_ID_RESPONSE: OpCode = op(ProtoBuf, InnerAddressResponse, 11);
pub const SET_FORWARD_SESSION_REQUEST: OpCode = op(ProtoBuf, InnerAddressRequest, 12);
pub const SET_FORWARD_SESSION_RESPONSE: OpCode = op(ProtoBuf, InnerAddressResponse, 12);
pub const TRANSFER_TERMINUS_REQUEST: OpCode = op(Json, InnerAddressRequest, 13);
pub const TRANSFER_TERMINUS_RESPONSE: OpCode = op(Json, InnerAddressResponse, 13);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn all() -> Vec<OpCode> {
        vec![
            PING_REQUEST,
            PING_RESPONSE,
            DEFAULT_RESPONSE,
            ROUTE_RESPONSE,
            ADDRESSABLE_ADD_REQUEST,
            ADDRESSABLE_ADD_RESPONSE,
            ADDRESSABLE_GET_REQUEST,
            ADDRESSABLE_GET_RESPONSE,
            ADDRESSABLE_REMOVE_REQUEST,
            ADDRESSABLE_REMOVE_RESPONSE,
            ADDRESSABLE_LOCK_REQUEST,
            ADDRESSABLE_LOCK_RESPONSE,
            ADDRESSABLE_UNLOCK_REQUEST,
            ADDRESSABLE_UNLOCK_RESPONSE,
            LINK_ROAMING_REQUEST,
            LINK_ROAMING_RESPONSE,
            UNLINK_ROAMING_REQUEST,
            UNLINK_ROAMING_RESPONSE,
            LOCK_TERMINUS_ID_REQUEST,
            LOCK_TERMINUS_ID_RESPONSE,
            UNLOCK_TERMINUS_ID_REQUEST,
            UNLOCK_TERMINUS_ID_RESPONSE,
            GET_TERMINUS_ID_REQUEST,
            GET_TERMINUS_ID_RESPONSE,
            SET_FORWARD_SESSION_REQUEST,
            SET_FORWARD_SESSION_RESPONSE,
            TRANSFER_TERMINUS_REQUEST,
            TRANSFER_TERMINUS_RESPONSE,
        ]
    }

    #[test]
    fn builtin_opcodes_are_distinct() {
        let all = all();
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn type_index_is_unique_per_protocol_bucket() {
        let all = all();
        let buckets: HashSet<_> = all.iter().map(|op| (op.protocol(), op.index())).collect();
        assert_eq!(buckets.len(), all.len());
    }
}
