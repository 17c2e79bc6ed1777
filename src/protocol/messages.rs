//! Built-in messages used by the runtime for pings, fallback failures, the addressable
//! directory, and the roaming protocol.

use super::ErrorCode;
use crate::address::Address;
use crate::opcode::builtin::*;
use crate::{request, response};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PingRequest {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PingResponse {
    pub error_code: ErrorCode,
    /// Server wall clock in milliseconds since the Unix epoch.
    pub now_ms: u64,
}

request!(PingRequest => PING_REQUEST, response = PingResponse);
response!(PingResponse => PING_RESPONSE);

/// Failure shape for direct requests whose response type is unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultResponse {
    pub error_code: ErrorCode,
}

response!(DefaultResponse => DEFAULT_RESPONSE);

/// Failure shape for address-scoped requests whose response type is unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteResponse {
    pub error_code: ErrorCode,
}

response!(RouteResponse => ROUTE_RESPONSE);

// -----------------------------------------------------------------------------
// Addressable directory
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressableAddRequest {
    pub key: i64,
    pub owner: Address,
    pub lock: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressableAddResponse {
    pub error_code: ErrorCode,
}

request!(AddressableAddRequest => ADDRESSABLE_ADD_REQUEST, response = AddressableAddResponse);
response!(AddressableAddResponse => ADDRESSABLE_ADD_RESPONSE);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressableGetRequest {
    pub key: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressableGetResponse {
    pub error_code: ErrorCode,
    pub owner: Address,
}

request!(AddressableGetRequest => ADDRESSABLE_GET_REQUEST, response = AddressableGetResponse);
response!(AddressableGetResponse => ADDRESSABLE_GET_RESPONSE);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressableRemoveRequest {
    pub key: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressableRemoveResponse {
    pub error_code: ErrorCode,
}

request!(AddressableRemoveRequest => ADDRESSABLE_REMOVE_REQUEST, response = AddressableRemoveResponse);
response!(AddressableRemoveResponse => ADDRESSABLE_REMOVE_RESPONSE);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressableLockRequest {
    pub key: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressableLockResponse {
    pub error_code: ErrorCode,
}

request!(AddressableLockRequest => ADDRESSABLE_LOCK_REQUEST, response = AddressableLockResponse);
response!(AddressableLockResponse => ADDRESSABLE_LOCK_RESPONSE);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressableUnLockRequest {
    pub key: i64,
    pub owner: Address,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressableUnLockResponse {
    pub error_code: ErrorCode,
}

request!(AddressableUnLockRequest => ADDRESSABLE_UNLOCK_REQUEST, response = AddressableUnLockResponse);
response!(AddressableUnLockResponse => ADDRESSABLE_UNLOCK_RESPONSE);

// -----------------------------------------------------------------------------
// Roaming
// -----------------------------------------------------------------------------

/// Sent by the gate to the scene that will host a new terminus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkRoamingRequest {
    pub roaming_id: i64,
    pub roaming_type: u32,
    pub forward_scene: Address,
    pub forward_session: Address,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkRoamingResponse {
    pub error_code: ErrorCode,
    pub terminus_id: Address,
}

request!(LinkRoamingRequest => LINK_ROAMING_REQUEST, response = LinkRoamingResponse);
response!(LinkRoamingResponse => LINK_ROAMING_RESPONSE);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnLinkRoamingRequest {
    pub terminus_id: Address,
    /// Also drop the linked entity instead of leaving it to its owner.
    pub dispose_entity: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnLinkRoamingResponse {
    pub error_code: ErrorCode,
}

request!(UnLinkRoamingRequest => UNLINK_ROAMING_REQUEST, response = UnLinkRoamingResponse);
response!(UnLinkRoamingResponse => UNLINK_ROAMING_RESPONSE);

/// Pauses forwarding for one roaming type of a gate session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockTerminusIdRequest {
    pub session: Address,
    pub roaming_type: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockTerminusIdResponse {
    pub error_code: ErrorCode,
}

request!(LockTerminusIdRequest => LOCK_TERMINUS_ID_REQUEST, response = LockTerminusIdResponse);
response!(LockTerminusIdResponse => LOCK_TERMINUS_ID_RESPONSE);

/// Resumes forwarding, pointing the link at `terminus_id` hosted by `target_scene`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnLockTerminusIdRequest {
    pub session: Address,
    pub roaming_type: u32,
    pub terminus_id: Address,
    pub target_scene: Address,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnLockTerminusIdResponse {
    pub error_code: ErrorCode,
}

request!(UnLockTerminusIdRequest => UNLOCK_TERMINUS_ID_REQUEST, response = UnLockTerminusIdResponse);
response!(UnLockTerminusIdResponse => UNLOCK_TERMINUS_ID_RESPONSE);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetTerminusIdRequest {
    pub session: Address,
    pub roaming_type: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetTerminusIdResponse {
    pub error_code: ErrorCode,
    pub terminus_id: Address,
}

request!(GetTerminusIdRequest => GET_TERMINUS_ID_REQUEST, response = GetTerminusIdResponse);
response!(GetTerminusIdResponse => GET_TERMINUS_ID_RESPONSE);

/// Points a terminus at a new gate session after the client reconnected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetForwardSessionRequest {
    pub terminus_id: Address,
    pub forward_session: Address,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetForwardSessionResponse {
    pub error_code: ErrorCode,
}

request!(SetForwardSessionRequest => SET_FORWARD_SESSION_REQUEST, response = SetForwardSessionResponse);
response!(SetForwardSessionResponse => SET_FORWARD_SESSION_RESPONSE);

/// Everything a destination scene needs to re-create a terminus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerminusSnapshot {
    pub roaming_id: i64,
    pub roaming_type: u32,
    pub forward_scene: Address,
    pub forward_session: Address,
    pub entity_type: Option<String>,
    pub entity: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferTerminusRequest {
    pub snapshot: TerminusSnapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferTerminusResponse {
    pub error_code: ErrorCode,
}

request!(TransferTerminusRequest => TRANSFER_TERMINUS_REQUEST, response = TransferTerminusResponse);
response!(TransferTerminusResponse => TRANSFER_TERMINUS_RESPONSE);
