//! Type descriptors and the table an assembly registers.

use crate::opcode::OpCode;
use crate::protocol::{CodecError, ErrorCode, Message, Request, Response};
use bytes::Bytes;
use std::any::TypeId;

type FailureFn = fn(ErrorCode) -> Result<Bytes, CodecError>;

/// Everything the runtime knows about one message type.
#[derive(Debug, Clone)]
pub struct MessageType {
    pub opcode: OpCode,
    pub name: &'static str,
    pub type_id: TypeId,
    pub route_type: u32,
    /// Declared response opcode, for requests.
    pub response: Option<OpCode>,
    failure: Option<FailureFn>,
}

impl MessageType {
    pub fn of<M: Message>() -> Self {
        Self {
            opcode: M::OPCODE,
            name: short_name::<M>(),
            type_id: TypeId::of::<M>(),
            route_type: M::ROUTE_TYPE,
            response: None,
            failure: None,
        }
    }

    pub fn request<R: Request>() -> Self {
        Self {
            response: Some(<R::Response as Message>::OPCODE),
            ..Self::of::<R>()
        }
    }

    pub fn response<R: Response>() -> Self {
        Self {
            failure: Some(encode_failure::<R>),
            ..Self::of::<R>()
        }
    }

    /// Encodes a failure of this (response) type, or `None` for non-response types.
    pub fn failure_payload(&self, code: ErrorCode) -> Option<Result<Bytes, CodecError>> {
        self.failure.map(|f| f(code))
    }
}

fn encode_failure<R: Response>(code: ErrorCode) -> Result<Bytes, CodecError> {
    R::failure(code).encode()
}

pub(crate) fn short_name<T>() -> &'static str {
    std::any::type_name::<T>()
        .rsplit("::")
        .next()
        .unwrap_or("Unknown")
}

/// Builder for the types one assembly contributes.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: Vec<MessageType>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message<M: Message>(&mut self) -> &mut Self {
        self.push(MessageType::of::<M>())
    }

    /// Registers a request together with its response type.
    pub fn request<R: Request>(&mut self) -> &mut Self {
        self.push(MessageType::request::<R>());
        self.response::<R::Response>()
    }

    pub fn response<R: Response>(&mut self) -> &mut Self {
        self.push(MessageType::response::<R>())
    }

    fn push(&mut self, ty: MessageType) -> &mut Self {
        if !self.types.iter().any(|t| t.type_id == ty.type_id) {
            self.types.push(ty);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageType> {
        self.types.iter()
    }
}
