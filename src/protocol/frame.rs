//! The frame envelope.

use super::messages::RouteResponse;
use super::{CodecError, ErrorCode, Message};
use crate::address::Address;
use crate::opcode::OpCode;
use bytes::Bytes;

/// One unit of traffic as handed over by the transport.
///
/// `rpc_id == 0` means no reply is expected; `address == Address::NONE` means the frame is not
/// actor-scoped. A frame is moved into whichever path consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub opcode: OpCode,
    pub rpc_id: u32,
    pub address: Address,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: OpCode, rpc_id: u32, address: Address, payload: Bytes) -> Self {
        Self { opcode, rpc_id, address, payload }
    }

    /// Encodes `message` into a frame for `address`.
    pub fn encode<M: Message>(message: &M, rpc_id: u32, address: Address) -> Result<Self, CodecError> {
        Ok(Self::new(M::OPCODE, rpc_id, address, message.encode()?))
    }

    pub fn decode<M: Message>(&self) -> Result<M, CodecError> {
        M::decode(&self.payload)
    }

    pub fn expects_reply(&self) -> bool {
        self.rpc_id != 0
    }

    /// The error code of a response frame without knowing its concrete type.
    ///
    /// Every response shape carries `error_code`, so the generic route shape can read it.
    /// Payloads that do not decode report [`ErrorCode::RPC_FAIL`].
    pub fn response_code(&self) -> ErrorCode {
        RouteResponse::decode(&self.payload).map_or(ErrorCode::RPC_FAIL, |r| r.error_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::PingResponse;

    #[test]
    fn response_code_reads_any_response_shape() {
        let ok = PingResponse { now_ms: 5, ..Default::default() };
        let frame = Frame::encode(&ok, 1, Address::NONE).unwrap();
        assert_eq!(frame.response_code(), ErrorCode::OK);

        let failed = PingResponse {
            error_code: ErrorCode::NOT_FOUND_ROUTE,
            now_ms: 0,
        };
        let frame = Frame::encode(&failed, 1, Address::NONE).unwrap();
        assert_eq!(frame.response_code(), ErrorCode::NOT_FOUND_ROUTE);
    }

    #[test]
    fn undecodable_payload_reports_rpc_fail() {
        let frame = Frame::new(PingResponse::OPCODE, 1, Address::NONE, Bytes::from_static(b"not json"));
        assert_eq!(frame.response_code(), ErrorCode::RPC_FAIL);
        assert!(frame.expects_reply());
    }
}
