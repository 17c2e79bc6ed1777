//! # Type Registry
//!
//! Bidirectional map between opcodes and message types, plus the request → response
//! relation used to build well-typed failure responses.
//!
//! ## Hot Reload
//!
//! Tables are loaded and unloaded per *assembly* (a named group of types shipped together).
//! Every change builds a complete new [`TypeSnapshot`] and publishes it with a single
//! `ArcSwap` swap. A reader grabs one snapshot per lookup and therefore sees either the old or
//! the new table, never a half-applied reload.

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;

use crate::opcode::{OpCode, Scope};
use crate::protocol::messages::{DefaultResponse, RouteResponse};
use crate::protocol::{CodecError, ErrorCode, Message, Response};
use arc_swap::ArcSwap;
use bytes::Bytes;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// One immutable version of the type table.
#[derive(Default, Clone)]
pub struct TypeSnapshot {
    by_opcode: HashMap<OpCode, Arc<MessageType>>,
    by_type: HashMap<TypeId, OpCode>,
    owners: HashMap<OpCode, String>,
}

impl TypeSnapshot {
    pub fn len(&self) -> usize {
        self.by_opcode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_opcode.is_empty()
    }

    pub fn get(&self, opcode: OpCode) -> Option<&Arc<MessageType>> {
        self.by_opcode.get(&opcode)
    }

    fn without(&self, assembly: &str) -> TypeSnapshot {
        let mut next = self.clone();
        let removed: Vec<OpCode> = next
            .owners
            .iter()
            .filter(|(_, owner)| owner.as_str() == assembly)
            .map(|(opcode, _)| *opcode)
            .collect();
        for opcode in removed {
            next.owners.remove(&opcode);
            if let Some(ty) = next.by_opcode.remove(&opcode) {
                next.by_type.remove(&ty.type_id);
            }
        }
        next
    }

    fn with(&self, assembly: &str, table: &TypeTable) -> Result<TypeSnapshot, RegistryError> {
        let mut next = self.without(assembly);
        for ty in table.iter() {
            if ty.opcode.is_none() {
                return Err(RegistryError::ZeroOpCode);
            }
            if let Some(existing) = next.by_opcode.get(&ty.opcode) {
                if existing.type_id == ty.type_id {
                    continue;
                }
                return Err(RegistryError::DuplicateOpCode {
                    opcode: ty.opcode,
                    existing: existing.name,
                    incoming: ty.name,
                });
            }
            next.by_type.insert(ty.type_id, ty.opcode);
            next.owners.insert(ty.opcode, assembly.to_string());
            next.by_opcode.insert(ty.opcode, Arc::new(ty.clone()));
        }
        Ok(next)
    }
}

/// The live, hot-reloadable type table.
pub struct TypeRegistry {
    snapshot: ArcSwap<TypeSnapshot>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(TypeSnapshot::default()),
        }
    }

    /// Publishes `table` under `assembly`, replacing whatever that assembly loaded before.
    pub fn load(&self, assembly: &str, table: &TypeTable) -> Result<(), RegistryError> {
        let mut outcome = Ok(());
        self.snapshot.rcu(|current| match current.with(assembly, table) {
            Ok(next) => {
                outcome = Ok(());
                Arc::new(next)
            }
            Err(e) => {
                outcome = Err(e);
                Arc::clone(current)
            }
        });
        if outcome.is_ok() {
            info!(assembly, types = table.len(), "Type table loaded");
        }
        outcome
    }

    /// Removes every type owned by `assembly`.
    pub fn unload(&self, assembly: &str) {
        self.snapshot.rcu(|current| current.without(assembly));
        info!(assembly, "Type table unloaded");
    }

    pub fn snapshot(&self) -> Arc<TypeSnapshot> {
        self.snapshot.load_full()
    }

    pub fn resolve(&self, opcode: OpCode) -> Result<Arc<MessageType>, RegistryError> {
        if opcode.is_none() {
            return Err(RegistryError::ZeroOpCode);
        }
        self.snapshot
            .load()
            .by_opcode
            .get(&opcode)
            .cloned()
            .ok_or(RegistryError::UnknownOpCode(opcode))
    }

    pub fn opcode_of<M: 'static>(&self) -> Option<OpCode> {
        self.snapshot.load().by_type.get(&TypeId::of::<M>()).copied()
    }

    /// The declared response type of a request, if the request is registered.
    pub fn response_type_for(&self, request: OpCode) -> Option<Arc<MessageType>> {
        let snapshot = self.snapshot.load();
        let response = snapshot.by_opcode.get(&request)?.response?;
        snapshot.by_opcode.get(&response).cloned()
    }

    /// Builds a failure response for `request` carrying `code`.
    ///
    /// Uses the declared response type when one is registered, otherwise the generic
    /// direct or address-scoped failure shape.
    pub fn failure_response(&self, request: OpCode, code: ErrorCode) -> Result<(OpCode, Bytes), CodecError> {
        if let Some(ty) = self.response_type_for(request) {
            if let Some(payload) = ty.failure_payload(code) {
                return Ok((ty.opcode, payload?));
            }
        }

        let direct = matches!(request.classify(), Ok(class) if class.scope == Scope::Direct);
        debug!(%request, direct, "No typed response, using fallback shape");
        if direct {
            Ok((DefaultResponse::OPCODE, DefaultResponse::failure(code).encode()?))
        } else {
            Ok((RouteResponse::OPCODE, RouteResponse::failure(code).encode()?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::{OpCodeType, PackFormat};
    use crate::protocol::messages::{AddressableGetRequest, AddressableGetResponse};
    use crate::{request, response};
    use serde::{Deserialize, Serialize};

    const ECHO: OpCode = OpCode::new(PackFormat::Json, OpCodeType::InnerRequest, 900);
    const ECHO_REPLY: OpCode = OpCode::new(PackFormat::Json, OpCodeType::InnerResponse, 900);

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Echo {
        text: String,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct EchoReply {
        error_code: ErrorCode,
        text: String,
    }

    request!(Echo => ECHO, response = EchoReply);
    response!(EchoReply => ECHO_REPLY);

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Impostor {}
    crate::message!(Impostor => ECHO);

    #[test]
    fn resolve_both_directions() {
        let registry = TypeRegistry::new();
        let mut table = TypeTable::new();
        table.request::<Echo>();
        registry.load("game", &table).unwrap();

        assert_eq!(registry.resolve(ECHO).unwrap().type_id, TypeId::of::<Echo>());
        assert_eq!(registry.opcode_of::<EchoReply>(), Some(ECHO_REPLY));
        assert_eq!(registry.response_type_for(ECHO).unwrap().opcode, ECHO_REPLY);
        assert!(matches!(registry.resolve(OpCode::NONE), Err(RegistryError::ZeroOpCode)));
    }

    #[test]
    fn failure_response_is_typed() {
        let registry = TypeRegistry::new();
        let mut table = TypeTable::new();
        table.request::<Echo>().request::<AddressableGetRequest>();
        registry.load("game", &table).unwrap();

        let (opcode, payload) = registry.failure_response(ECHO, ErrorCode::RPC_FAIL).unwrap();
        assert_eq!(opcode, ECHO_REPLY);
        let reply = EchoReply::decode(&payload).unwrap();
        assert_eq!(reply.error_code, ErrorCode::RPC_FAIL);

        let (opcode, payload) = registry
            .failure_response(AddressableGetRequest::OPCODE, ErrorCode::NOT_FOUND_ROUTE)
            .unwrap();
        assert_eq!(opcode, AddressableGetResponse::OPCODE);
        assert_eq!(
            AddressableGetResponse::decode(&payload).unwrap().error_code,
            ErrorCode::NOT_FOUND_ROUTE
        );
    }

    #[test]
    fn unknown_request_falls_back_by_scope() {
        let registry = TypeRegistry::new();
        let (opcode, _) = registry.failure_response(ECHO, ErrorCode::RPC_FAIL).unwrap();
        assert_eq!(opcode, DefaultResponse::OPCODE);

        let addressed = OpCode::new(PackFormat::Json, OpCodeType::InnerAddressRequest, 900);
        let (opcode, _) = registry.failure_response(addressed, ErrorCode::RPC_FAIL).unwrap();
        assert_eq!(opcode, RouteResponse::OPCODE);
    }

    #[test]
    fn conflicting_opcode_keeps_previous_snapshot() {
        let registry = TypeRegistry::new();
        let mut table = TypeTable::new();
        table.request::<Echo>();
        registry.load("game", &table).unwrap();

        let mut other = TypeTable::new();
        other.message::<Impostor>();
        let err = registry.load("mod", &other).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateOpCode { .. }));
        assert_eq!(registry.resolve(ECHO).unwrap().type_id, TypeId::of::<Echo>());
    }

    #[test]
    fn unload_publishes_a_new_snapshot() {
        let registry = TypeRegistry::new();
        let mut table = TypeTable::new();
        table.request::<Echo>();
        registry.load("game", &table).unwrap();

        let before = registry.snapshot();
        registry.unload("game");

        assert_eq!(before.len(), 2, "old readers keep their snapshot");
        assert!(registry.snapshot().is_empty());
        assert!(matches!(registry.resolve(ECHO), Err(RegistryError::UnknownOpCode(_))));
    }
}
