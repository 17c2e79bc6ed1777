//! # Handlers
//!
//! Handlers are registered per message type in a [`HandlerSet`] and loaded into the
//! [`MessageDispatcher`](super::MessageDispatcher) as one unit.
//!
//! Four shapes exist, mirroring the two axes of the opcode classification:
//!
//! | | not addressed | addressed to an entity `E` |
//! |---|---|---|
//! | message | [`MessageHandler`] | [`AddressMessageHandler`] |
//! | request | [`RequestHandler`] | [`AddressRequestHandler`] |
//!
//! Addressed handlers receive the entity the frame was routed to, already downcast to `E`.
//! Handlers bound to a scene root use `E = Scene`.

use super::HandlerError;
use crate::address::Address;
use crate::opcode::OpCode;
use crate::protocol::{CodecError, Frame, Message, Request};
use crate::registry::{short_name, TypeTable};
use crate::roaming::{EntityLoader, RoamingEntity};
use crate::scene::{EntityEntry, Scene, Session};
use async_trait::async_trait;
use bytes::Bytes;
use std::marker::PhantomData;
use std::sync::Arc;

/// Everything a handler knows about the frame it is handling.
#[derive(Clone)]
pub struct MessageContext {
    scene: Scene,
    session: Arc<dyn Session>,
    address: Address,
    rpc_id: u32,
    opcode: OpCode,
}

impl MessageContext {
    pub(crate) fn new(scene: Scene, session: Arc<dyn Session>, frame: &Frame) -> Self {
        Self {
            scene,
            session,
            address: frame.address,
            rpc_id: frame.rpc_id,
            opcode: frame.opcode,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// The session the frame arrived from. Replies go here.
    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn rpc_id(&self) -> u32 {
        self.rpc_id
    }

    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Pushes a message to the originating session outside of the request/response flow.
    pub fn push<M: Message>(&self, message: &M) -> Result<(), CodecError> {
        self.session.send(Frame::encode(message, 0, Address::NONE)?);
        Ok(())
    }
}

#[async_trait]
pub trait MessageHandler<M: Message>: Send + Sync + 'static {
    async fn handle(&self, ctx: &MessageContext, message: M) -> Result<(), HandlerError>;
}

#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync + 'static {
    async fn handle(&self, ctx: &MessageContext, request: R) -> Result<R::Response, HandlerError>;
}

#[async_trait]
pub trait AddressMessageHandler<E: Send + Sync + 'static, M: Message>: Send + Sync + 'static {
    async fn handle(&self, ctx: &MessageContext, entity: Arc<E>, message: M) -> Result<(), HandlerError>;
}

#[async_trait]
pub trait AddressRequestHandler<E: Send + Sync + 'static, R: Request>: Send + Sync + 'static {
    async fn handle(&self, ctx: &MessageContext, entity: Arc<E>, request: R) -> Result<R::Response, HandlerError>;
}

/// Type-erased handler as stored in the dispatcher's table.
#[async_trait]
pub(crate) trait ErasedHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decodes `payload`, runs the handler and encodes its response, if any.
    async fn invoke(
        &self,
        ctx: MessageContext,
        entity: Option<EntityEntry>,
        payload: Bytes,
    ) -> Result<Option<(OpCode, Bytes)>, HandlerError>;
}

fn routed<E: Send + Sync + 'static>(entity: Option<EntityEntry>) -> Result<Arc<E>, HandlerError> {
    entity
        .and_then(|entry| entry.downcast::<E>())
        .ok_or(HandlerError::EntityMismatch { expected: short_name::<E>() })
}

fn encoded<R: Request>(response: R::Response) -> Result<Option<(OpCode, Bytes)>, HandlerError> {
    let payload = Message::encode(&response)?;
    Ok(Some((<R::Response as Message>::OPCODE, payload)))
}

struct Direct<M, H> {
    handler: H,
    _marker: PhantomData<fn() -> M>,
}

struct Addressed<E, M, H> {
    handler: H,
    _marker: PhantomData<fn() -> (E, M)>,
}

#[async_trait]
impl<M: Message, H: MessageHandler<M>> ErasedHandler for Direct<M, H> {
    fn name(&self) -> &'static str {
        short_name::<H>()
    }

    async fn invoke(&self, ctx: MessageContext, _entity: Option<EntityEntry>, payload: Bytes) -> Result<Option<(OpCode, Bytes)>, HandlerError> {
        let message = M::decode(&payload)?;
        self.handler.handle(&ctx, message).await?;
        Ok(None)
    }
}

struct DirectRequest<R, H>(Direct<R, H>);

#[async_trait]
impl<R: Request, H: RequestHandler<R>> ErasedHandler for DirectRequest<R, H> {
    fn name(&self) -> &'static str {
        short_name::<H>()
    }

    async fn invoke(&self, ctx: MessageContext, _entity: Option<EntityEntry>, payload: Bytes) -> Result<Option<(OpCode, Bytes)>, HandlerError> {
        let request = R::decode(&payload)?;
        let response = self.0.handler.handle(&ctx, request).await?;
        encoded::<R>(response)
    }
}

#[async_trait]
impl<E, M, H> ErasedHandler for Addressed<E, M, H>
where
    E: Send + Sync + 'static,
    M: Message,
    H: AddressMessageHandler<E, M>,
{
    fn name(&self) -> &'static str {
        short_name::<H>()
    }

    async fn invoke(&self, ctx: MessageContext, entity: Option<EntityEntry>, payload: Bytes) -> Result<Option<(OpCode, Bytes)>, HandlerError> {
        let entity = routed::<E>(entity)?;
        let message = M::decode(&payload)?;
        self.handler.handle(&ctx, entity, message).await?;
        Ok(None)
    }
}

struct AddressedRequest<E, R, H>(Addressed<E, R, H>);

#[async_trait]
impl<E, R, H> ErasedHandler for AddressedRequest<E, R, H>
where
    E: Send + Sync + 'static,
    R: Request,
    H: AddressRequestHandler<E, R>,
{
    fn name(&self) -> &'static str {
        short_name::<H>()
    }

    async fn invoke(&self, ctx: MessageContext, entity: Option<EntityEntry>, payload: Bytes) -> Result<Option<(OpCode, Bytes)>, HandlerError> {
        let entity = routed::<E>(entity)?;
        let request = R::decode(&payload)?;
        let response = self.0.handler.handle(&ctx, entity, request).await?;
        encoded::<R>(response)
    }
}

/// Handlers, message types and roaming entity loaders loaded and unloaded together.
pub struct HandlerSet {
    pub(crate) assembly: String,
    pub(crate) types: TypeTable,
    pub(crate) handlers: Vec<(OpCode, Arc<dyn ErasedHandler>)>,
    pub(crate) loaders: Vec<(&'static str, EntityLoader)>,
}

impl HandlerSet {
    pub fn new(assembly: impl Into<String>) -> Self {
        Self {
            assembly: assembly.into(),
            types: TypeTable::new(),
            handlers: Vec::new(),
            loaders: Vec::new(),
        }
    }

    pub fn assembly(&self) -> &str {
        &self.assembly
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn message<M: Message, H: MessageHandler<M>>(mut self, handler: H) -> Self {
        self.types.message::<M>();
        self.push(M::OPCODE, Direct::<M, H> { handler, _marker: PhantomData });
        self
    }

    pub fn request<R: Request, H: RequestHandler<R>>(mut self, handler: H) -> Self {
        self.types.request::<R>();
        self.push(R::OPCODE, DirectRequest(Direct::<R, H> { handler, _marker: PhantomData }));
        self
    }

    pub fn address_message<E, M, H>(mut self, handler: H) -> Self
    where
        E: Send + Sync + 'static,
        M: Message,
        H: AddressMessageHandler<E, M>,
    {
        self.types.message::<M>();
        self.push(M::OPCODE, Addressed::<E, M, H> { handler, _marker: PhantomData });
        self
    }

    pub fn address_request<E, R, H>(mut self, handler: H) -> Self
    where
        E: Send + Sync + 'static,
        R: Request,
        H: AddressRequestHandler<E, R>,
    {
        self.types.request::<R>();
        self.push(R::OPCODE, AddressedRequest(Addressed::<E, R, H> { handler, _marker: PhantomData }));
        self
    }

    /// Registers message types without handlers, e.g. requests this assembly only sends.
    pub fn types(mut self, register: impl FnOnce(&mut TypeTable)) -> Self {
        register(&mut self.types);
        self
    }

    /// Makes `E` restorable on scenes that receive a transferred terminus.
    pub fn roaming_entity<E: RoamingEntity>(mut self) -> Self {
        self.loaders.push((E::ENTITY_TYPE, crate::roaming::loader::<E> as EntityLoader));
        self
    }

    fn push(&mut self, opcode: OpCode, handler: impl ErasedHandler + 'static) {
        self.handlers.push((opcode, Arc::new(handler)));
    }
}
