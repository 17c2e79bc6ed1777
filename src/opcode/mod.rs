//! # OpCode Classification
//!
//! An [`OpCode`] identifies both a concrete message type and the path a frame takes through
//! the dispatcher. The routing part is read by bit-mask, before any payload is decoded.
//!
//! ```text
//!  31        27 26     23 22                              0
//! +------------+---------+--------------------------------+
//! | protocol   |  pack   |            type index          |
//! |  (5 bit)   | (4 bit) |             (23 bit)           |
//! +------------+---------+--------------------------------+
//! ```
//!
//! The protocol field selects one [`OpCodeType`], which maps to exactly one
//! [`Classification`]: endpoint × kind × scope. Values outside the table are a protocol
//! violation and close the originating connection.

pub mod builtin;
pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::fmt;

const INDEX_BITS: u32 = 23;
const PACK_BITS: u32 = 4;
const PACK_SHIFT: u32 = INDEX_BITS;
const PROTOCOL_SHIFT: u32 = INDEX_BITS + PACK_BITS;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
const PACK_MASK: u32 = (1 << PACK_BITS) - 1;

/// Which side of the cluster a message travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Between scenes inside the cluster.
    Inner,
    /// Between a client and its gate scene.
    Outer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Message,
    Request,
    Response,
}

/// How the target of a frame is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Handled by the receiving scene itself.
    Direct,
    /// Routed to the entity named by the frame address.
    Address,
    /// Routed through the addressable directory.
    Addressable,
    /// Routed through a per-session route table on the gate.
    CustomRoute,
    /// Routed to a roaming terminus.
    Roaming,
}

/// The routing tag carried by every opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Classification {
    pub endpoint: Endpoint,
    pub kind: Kind,
    pub scope: Scope,
}

impl Classification {
    const fn of(endpoint: Endpoint, kind: Kind, scope: Scope) -> Self {
        Self { endpoint, kind, scope }
    }

    pub fn is_request(&self) -> bool {
        self.kind == Kind::Request
    }

    pub fn is_response(&self) -> bool {
        self.kind == Kind::Response
    }
}

/// Payload encoding tag carried in the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PackFormat {
    ProtoBuf = 0,
    Bson = 1,
    MemoryPack = 2,
    Json = 3,
}

/// The protocol field of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCodeType {
    OuterMessage = 1,
    OuterRequest = 2,
    OuterResponse = 3,
    InnerMessage = 4,
    InnerRequest = 5,
    InnerResponse = 6,
    InnerAddressMessage = 7,
    InnerAddressRequest = 8,
    InnerAddressResponse = 9,
    OuterAddressableMessage = 10,
    OuterAddressableRequest = 11,
    OuterAddressableResponse = 12,
    InnerAddressableMessage = 13,
    InnerAddressableRequest = 14,
    InnerAddressableResponse = 15,
    OuterCustomRouteMessage = 16,
    OuterCustomRouteRequest = 17,
    OuterCustomRouteResponse = 18,
    OuterRoamingMessage = 19,
    OuterRoamingRequest = 20,
    OuterRoamingResponse = 21,
    InnerRoamingMessage = 22,
    InnerRoamingRequest = 23,
    InnerRoamingResponse = 24,
    OuterPingRequest = 30,
    OuterPingResponse = 31,
}

impl OpCodeType {
    pub const fn classification(self) -> Classification {
        use Endpoint::*;
        use Kind::*;
        use OpCodeType as T;

        match self {
            T::OuterMessage => Classification::of(Outer, Message, Scope::Direct),
            T::OuterRequest => Classification::of(Outer, Request, Scope::Direct),
            T::OuterResponse => Classification::of(Outer, Response, Scope::Direct),
            T::InnerMessage => Classification::of(Inner, Message, Scope::Direct),
            T::InnerRequest => Classification::of(Inner, Request, Scope::Direct),
            T::InnerResponse => Classification::of(Inner, Response, Scope::Direct),
            T::InnerAddressMessage => Classification::of(Inner, Message, Scope::Address),
            T::InnerAddressRequest => Classification::of(Inner, Request, Scope::Address),
            T::InnerAddressResponse => Classification::of(Inner, Response, Scope::Address),
            T::OuterAddressableMessage => Classification::of(Outer, Message, Scope::Addressable),
            T::OuterAddressableRequest => Classification::of(Outer, Request, Scope::Addressable),
            T::OuterAddressableResponse => Classification::of(Outer, Response, Scope::Addressable),
            T::InnerAddressableMessage => Classification::of(Inner, Message, Scope::Addressable),
            T::InnerAddressableRequest => Classification::of(Inner, Request, Scope::Addressable),
            T::InnerAddressableResponse => Classification::of(Inner, Response, Scope::Addressable),
            T::OuterCustomRouteMessage => Classification::of(Outer, Message, Scope::CustomRoute),
            T::OuterCustomRouteRequest => Classification::of(Outer, Request, Scope::CustomRoute),
            T::OuterCustomRouteResponse => Classification::of(Outer, Response, Scope::CustomRoute),
            T::OuterRoamingMessage => Classification::of(Outer, Message, Scope::Roaming),
            T::OuterRoamingRequest => Classification::of(Outer, Request, Scope::Roaming),
            T::OuterRoamingResponse => Classification::of(Outer, Response, Scope::Roaming),
            T::InnerRoamingMessage => Classification::of(Inner, Message, Scope::Roaming),
            T::InnerRoamingRequest => Classification::of(Inner, Request, Scope::Roaming),
            T::InnerRoamingResponse => Classification::of(Inner, Response, Scope::Roaming),
            T::OuterPingRequest => Classification::of(Outer, Request, Scope::Direct),
            T::OuterPingResponse => Classification::of(Outer, Response, Scope::Direct),
        }
    }
}

impl TryFrom<u32> for OpCodeType {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        use OpCodeType as T;

        Ok(match value {
            1 => T::OuterMessage,
            2 => T::OuterRequest,
            3 => T::OuterResponse,
            4 => T::InnerMessage,
            5 => T::InnerRequest,
            6 => T::InnerResponse,
            7 => T::InnerAddressMessage,
            8 => T::InnerAddressRequest,
            9 => T::InnerAddressResponse,
            10 => T::OuterAddressableMessage,
            11 => T::OuterAddressableRequest,
            12 => T::OuterAddressableResponse,
            13 => T::InnerAddressableMessage,
            14 => T::InnerAddressableRequest,
            15 => T::InnerAddressableResponse,
            16 => T::OuterCustomRouteMessage,
            17 => T::OuterCustomRouteRequest,
            18 => T::OuterCustomRouteResponse,
            19 => T::OuterRoamingMessage,
            20 => T::OuterRoamingRequest,
            21 => T::OuterRoamingResponse,
            22 => T::InnerRoamingMessage,
            23 => T::InnerRoamingRequest,
            24 => T::InnerRoamingResponse,
            30 => T::OuterPingRequest,
            31 => T::OuterPingResponse,
            other => return Err(ProtocolError::UnknownProtocolType(other)),
        })
    }
}

/// 32-bit wire identifier of a message type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpCode(u32);

impl OpCode {
    pub const NONE: OpCode = OpCode(0);

    pub const fn new(pack: PackFormat, protocol: OpCodeType, index: u32) -> Self {
        Self(
            ((protocol as u32) << PROTOCOL_SHIFT)
                | ((pack as u32 & PACK_MASK) << PACK_SHIFT)
                | (index & INDEX_MASK),
        )
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// The type index, unique within one protocol bucket.
    pub const fn index(self) -> u32 {
        self.0 & INDEX_MASK
    }

    /// Raw pack-format field; unknown values are passed through to the codec.
    pub const fn pack_format(self) -> u8 {
        ((self.0 >> PACK_SHIFT) & PACK_MASK) as u8
    }

    pub const fn protocol(self) -> u32 {
        self.0 >> PROTOCOL_SHIFT
    }

    pub fn opcode_type(self) -> Result<OpCodeType, ProtocolError> {
        OpCodeType::try_from(self.protocol())
    }

    /// Reads the routing tag. Total over `u32`: every value either classifies or errors.
    pub fn classify(self) -> Result<Classification, ProtocolError> {
        self.opcode_type().map(OpCodeType::classification)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_recovered_by_mask() {
        let op = OpCode::new(PackFormat::MemoryPack, OpCodeType::InnerRoamingRequest, 4711);
        assert_eq!(op.index(), 4711);
        assert_eq!(op.pack_format(), PackFormat::MemoryPack as u8);
        assert_eq!(op.opcode_type().unwrap(), OpCodeType::InnerRoamingRequest);
    }

    #[test]
    fn classification_table() {
        let cases = [
            (OpCodeType::InnerMessage, Endpoint::Inner, Kind::Message, Scope::Direct),
            (OpCodeType::InnerAddressRequest, Endpoint::Inner, Kind::Request, Scope::Address),
            (OpCodeType::InnerAddressableResponse, Endpoint::Inner, Kind::Response, Scope::Addressable),
            (OpCodeType::OuterCustomRouteMessage, Endpoint::Outer, Kind::Message, Scope::CustomRoute),
            (OpCodeType::OuterRoamingRequest, Endpoint::Outer, Kind::Request, Scope::Roaming),
            (OpCodeType::InnerRoamingResponse, Endpoint::Inner, Kind::Response, Scope::Roaming),
            (OpCodeType::OuterPingResponse, Endpoint::Outer, Kind::Response, Scope::Direct),
        ];

        for (ty, endpoint, kind, scope) in cases {
            let class = OpCode::new(PackFormat::ProtoBuf, ty, 1).classify().unwrap();
            assert_eq!(class, Classification { endpoint, kind, scope }, "{ty:?}");
        }
    }

    #[test]
    fn every_protocol_value_classifies_or_errors() {
        let mut known = 0;
        for protocol in 0..32u32 {
            let op = OpCode::from_raw(protocol << PROTOCOL_SHIFT | 9);
            match op.classify() {
                Ok(_) => known += 1,
                Err(e) => assert_eq!(e, ProtocolError::UnknownProtocolType(protocol)),
            }
        }
        assert_eq!(known, 26);
    }

    #[test]
    fn index_is_masked() {
        let op = OpCode::new(PackFormat::ProtoBuf, OpCodeType::InnerMessage, u32::MAX);
        assert_eq!(op.index(), INDEX_MASK);
        assert_eq!(op.opcode_type().unwrap(), OpCodeType::InnerMessage);
    }
}
