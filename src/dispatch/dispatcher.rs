//! # MessageDispatcher
//!
//! Turns an incoming [`Frame`] into exactly one of: a correlator completion, a local handler
//! invocation, a forward to another scene or client, or a failure response.
//!
//! ## Synchronous prefix
//! Classification, the routing decision and the route-lock enqueue all happen inside
//! [`MessageDispatcher::dispatch`] before it returns. Frames for the same address therefore
//! take their lock positions in arrival order, and only the handler body runs later as a
//! scene job.
//!
//! ## Reply guarantee
//! A request with a non-zero rpc id always gets one response: the handler's, or a failure
//! response shaped by the type registry.

use super::handler::ErasedHandler;
use super::{HandlerError, HandlerSet, MessageContext};
use crate::address::Address;
use crate::opcode::{Classification, Endpoint, Kind, OpCode, ProtocolError, Scope};
use crate::protocol::messages::{PingRequest, PingResponse};
use crate::protocol::{ErrorCode, Frame, Message};
use crate::registry::{RegistryError, TypeRegistry};
use crate::roaming::EntityLoader;
use crate::scene::{EntityEntry, Scene, Session, SessionEntity, SessionKind};
use arc_swap::ArcSwap;
use bytes::Bytes;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, trace, warn};

#[derive(Clone, Default)]
struct HandlerTable {
    handlers: HashMap<OpCode, Arc<dyn ErasedHandler>>,
    owners: HashMap<OpCode, String>,
    loaders: HashMap<&'static str, (String, EntityLoader)>,
}

impl HandlerTable {
    fn without(&self, assembly: &str) -> HandlerTable {
        let mut next = self.clone();
        next.owners.retain(|_, owner| owner != assembly);
        let owners = &next.owners;
        next.handlers.retain(|opcode, _| owners.contains_key(opcode));
        next.loaders.retain(|_, (owner, _)| owner != assembly);
        next
    }
}

/// Routes frames to handlers. Owned by the process and shared by all its scenes.
pub struct MessageDispatcher {
    types: TypeRegistry,
    table: ArcSwap<HandlerTable>,
    writer: Mutex<()>,
}

impl Default for MessageDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self {
            types: TypeRegistry::new(),
            table: ArcSwap::from_pointee(HandlerTable::default()),
            writer: Mutex::new(()),
        }
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Publishes `set`, replacing whatever its assembly loaded before.
    ///
    /// Fails without publishing anything when another assembly already handles one of the
    /// set's opcodes or claims one of its opcodes for a different type.
    pub fn load(&self, set: HandlerSet) -> Result<(), RegistryError> {
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.table.load_full();
        let mut next = current.without(&set.assembly);

        for (opcode, handler) in &set.handlers {
            if next.handlers.contains_key(opcode) {
                return Err(RegistryError::DuplicateHandler(*opcode));
            }
            next.handlers.insert(*opcode, Arc::clone(handler));
            next.owners.insert(*opcode, set.assembly.clone());
        }
        for (entity_type, loader) in &set.loaders {
            next.loaders.insert(*entity_type, (set.assembly.clone(), *loader));
        }

        self.types.load(&set.assembly, &set.types)?;
        self.table.store(Arc::new(next));
        info!(assembly = %set.assembly, handlers = set.handlers.len(), loaders = set.loaders.len(), "Handler set loaded");
        Ok(())
    }

    /// Removes every handler, type and loader owned by `assembly`.
    pub fn unload(&self, assembly: &str) {
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        self.table.rcu(|current| current.without(assembly));
        self.types.unload(assembly);
        info!(assembly, "Handler set unloaded");
    }

    pub fn has_handler(&self, opcode: OpCode) -> bool {
        self.table.load().handlers.contains_key(&opcode)
    }

    fn handler(&self, opcode: OpCode) -> Option<Arc<dyn ErasedHandler>> {
        self.table.load().handlers.get(&opcode).cloned()
    }

    pub(crate) fn loader(&self, entity_type: &str) -> Option<EntityLoader> {
        self.table.load().loaders.get(entity_type).map(|(_, loader)| *loader)
    }

    /// Routes one frame received by `scene` from `session`.
    ///
    /// A protocol violation closes the session and is returned; every other outcome,
    /// including failure responses, is handled internally.
    pub fn dispatch(&self, scene: &Scene, session: Arc<dyn Session>, frame: Frame) -> Result<(), ProtocolError> {
        let class = match frame.opcode.classify() {
            Ok(class) => class,
            Err(e) => return Err(violation(scene, &session, e)),
        };
        let outer = session.kind() == SessionKind::Outer;
        if outer && class.endpoint == Endpoint::Inner {
            return Err(violation(scene, &session, ProtocolError::InnerOpCodeFromClient(frame.opcode.raw())));
        }

        trace!(scene = %scene.id(), opcode = %frame.opcode, rpc_id = frame.rpc_id, address = %frame.address, "Dispatch");

        if class.kind == Kind::Response {
            if outer {
                return Err(violation(scene, &session, ProtocolError::ResponseFromClient(frame.opcode.raw())));
            }
            scene.correlator().on_response(frame);
            return Ok(());
        }
        if frame.opcode == PingRequest::OPCODE {
            reply_ping(&session, frame.rpc_id);
            return Ok(());
        }

        let routed = match class.scope {
            // Outer direct frames relayed between scenes carry the client's address.
            Scope::Direct => !outer && class.endpoint == Endpoint::Outer && !frame.address.is_none(),
            _ => true,
        };
        if !routed {
            self.dispatch_direct(scene, session, frame, class);
        } else if outer {
            crate::gate::route_outer(scene, session, frame, class);
        } else {
            self.dispatch_routed(scene, session, frame, class);
        }
        Ok(())
    }

    fn dispatch_direct(&self, scene: &Scene, session: Arc<dyn Session>, frame: Frame, class: Classification) {
        let owes_reply = class.is_request() && frame.expects_reply();
        if let Err(e) = self.types.resolve(frame.opcode) {
            warn!(scene = %scene.id(), opcode = %frame.opcode, error = %e, "Unresolvable message");
            if owes_reply {
                self.reply_failure(&session, frame.opcode, frame.rpc_id, ErrorCode::RPC_FAIL);
            }
            return;
        }
        let Some(handler) = self.handler(frame.opcode) else {
            warn!(scene = %scene.id(), opcode = %frame.opcode, "No handler registered");
            if owes_reply {
                self.reply_failure(&session, frame.opcode, frame.rpc_id, ErrorCode::RPC_FAIL);
            }
            return;
        };

        let ctx = MessageContext::new(scene.clone(), session, &frame);
        let dispatcher = Arc::clone(scene.dispatcher());
        scene.spawn(async move {
            run_handler(&dispatcher, handler, ctx, None, frame.payload, owes_reply).await;
        });
    }

    fn dispatch_routed(&self, scene: &Scene, session: Arc<dyn Session>, frame: Frame, class: Classification) {
        let target = frame.address;
        let opcode = frame.opcode;
        let rpc_id = frame.rpc_id;
        let owes_reply = class.is_request() && frame.expects_reply();

        if target.is_none() {
            debug!(scene = %scene.id(), %opcode, "Routed frame without address");
            if owes_reply {
                self.reply_failure(&session, opcode, rpc_id, ErrorCode::NOT_FOUND_ROUTE);
            }
            return;
        }

        if target.scene_id() != scene.id() {
            if let Err(e) = scene.network().deliver(Arc::clone(&session), frame) {
                warn!(scene = %scene.id(), %target, %opcode, rpc_id, error = %e, "Forward failed");
                if owes_reply {
                    self.reply_failure(&session, opcode, rpc_id, ErrorCode::NOT_FOUND_ROUTE);
                }
            }
            return;
        }

        let Some(entry) = scene.entry(target) else {
            debug!(scene = %scene.id(), %target, %opcode, "Entity not found");
            if owes_reply {
                self.reply_failure(&session, opcode, rpc_id, ErrorCode::NOT_FOUND_ROUTE);
            }
            return;
        };

        if let Some(client) = entry.downcast::<SessionEntity>() {
            trace!(scene = %scene.id(), %target, %opcode, "Forward to client session");
            client.session.send(frame);
            return;
        }

        let Some(handler) = self.handler(opcode) else {
            warn!(scene = %scene.id(), %target, %opcode, "No handler registered");
            if owes_reply {
                self.reply_failure(&session, opcode, rpc_id, ErrorCode::RPC_FAIL);
            }
            return;
        };

        let ctx = MessageContext::new(scene.clone(), Arc::clone(&session), &frame);
        let dispatcher = Arc::clone(scene.dispatcher());

        // Scene-level services run without the route lock so they can call each other.
        if target == scene.address() {
            scene.spawn(async move {
                run_handler(&dispatcher, handler, ctx, Some(entry), frame.payload, owes_reply).await;
            });
            return;
        }

        let wait = scene.route_lock().wait(target);
        let routed_scene = scene.clone();
        scene.spawn(async move {
            let _guard = match wait.await {
                Ok(guard) => guard,
                Err(e) => {
                    warn!(scene = %routed_scene.id(), %target, %opcode, error = %e, "Route lock wait failed");
                    if owes_reply {
                        dispatcher.reply_failure(&session, opcode, rpc_id, ErrorCode::ROUTE_TIMEOUT);
                    }
                    return;
                }
            };
            if !routed_scene.entities().is_current(target, entry.generation) {
                debug!(scene = %routed_scene.id(), %target, %opcode, "Entity changed while queued");
                if owes_reply {
                    dispatcher.reply_failure(&session, opcode, rpc_id, ErrorCode::ENTITY_NOT_FOUND);
                }
                return;
            }
            run_handler(&dispatcher, handler, ctx, Some(entry), frame.payload, owes_reply).await;
        });
    }

    /// Sends a failure response for `request` carrying `code` to `session`.
    pub(crate) fn reply_failure(&self, session: &Arc<dyn Session>, request: OpCode, rpc_id: u32, code: ErrorCode) {
        if rpc_id == 0 {
            return;
        }
        match self.types.failure_response(request, code) {
            Ok((opcode, payload)) => session.send(Frame::new(opcode, rpc_id, Address::NONE, payload)),
            Err(e) => error!(%request, rpc_id, error = %e, "Failed to encode failure response"),
        }
    }
}

async fn run_handler(
    dispatcher: &MessageDispatcher,
    handler: Arc<dyn ErasedHandler>,
    ctx: MessageContext,
    entity: Option<EntityEntry>,
    payload: Bytes,
    owes_reply: bool,
) {
    let opcode = ctx.opcode();
    let rpc_id = ctx.rpc_id();
    let outcome = AssertUnwindSafe(handler.invoke(ctx.clone(), entity, payload))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            error!(scene = %ctx.scene().id(), %opcode, handler = handler.name(), "Handler panicked");
            Err(HandlerError::failed("handler panicked"))
        });

    match outcome {
        Ok(Some((response, payload))) => {
            if owes_reply {
                ctx.session().send(Frame::new(response, rpc_id, Address::NONE, payload));
            }
        }
        Ok(None) => {
            if owes_reply {
                warn!(%opcode, handler = handler.name(), "Request handled without a response");
                dispatcher.reply_failure(ctx.session(), opcode, rpc_id, ErrorCode::RPC_FAIL);
            }
        }
        Err(e) => {
            warn!(scene = %ctx.scene().id(), %opcode, rpc_id, handler = handler.name(), error = %e, "Handler failed");
            if owes_reply {
                dispatcher.reply_failure(ctx.session(), opcode, rpc_id, e.code());
            }
        }
    }
}

fn violation(scene: &Scene, session: &Arc<dyn Session>, e: ProtocolError) -> ProtocolError {
    warn!(scene = %scene.id(), session = session.id(), error = %e, "Protocol violation, closing session");
    session.close();
    e
}

fn reply_ping(session: &Arc<dyn Session>, rpc_id: u32) {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default();
    let response = PingResponse {
        now_ms,
        ..PingResponse::default()
    };
    match Frame::encode(&response, rpc_id, Address::NONE) {
        Ok(frame) => session.send(frame),
        Err(e) => error!(rpc_id, error = %e, "Failed to encode ping response"),
    }
}
