//! # Gate
//!
//! Client connections terminate on a gate scene. Each accepted connection gets a
//! [`GateSession`]: a session entity the cluster can push to, plus the links that resolve the
//! client's addressable, custom-route and roaming frames to entities inside the cluster.
//!
//! # Architecture Note
//! Outer frames never reach handlers on the gate itself (apart from direct ones). They are
//! resolved here and re-enter the network as inner traffic:
//!
//! - requests through a gate job that calls the target and relays the response under the
//!   client's rpc id;
//! - custom-route frames are forwarded as-is with a [`RelaySession`] as reply path, so the
//!   target answers the client directly.

use crate::address::Address;
use crate::addressable::AddressableClient;
use crate::opcode::{Classification, Scope};
use crate::protocol::{ErrorCode, Frame};
use crate::roaming::SessionRoaming;
use crate::scene::{next_session_id, Scene, Session, SessionEntity, SessionKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// An accepted client connection and its links into the cluster.
pub struct GateSession {
    session: Arc<dyn Session>,
    address: Address,
    addressable: Mutex<Option<i64>>,
    routes: Mutex<HashMap<u32, Address>>,
    roaming: Mutex<Option<Arc<SessionRoaming>>>,
}

impl GateSession {
    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn id(&self) -> u64 {
        self.session.id()
    }

    /// Address of the session entity; messages sent here go to the client.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Routes the client's addressable frames to the entity registered under `key`.
    pub fn bind_addressable(&self, key: i64) {
        *lock(&self.addressable) = Some(key);
    }

    pub fn addressable(&self) -> Option<i64> {
        *lock(&self.addressable)
    }

    /// Routes custom-route frames of `route_type` to `address`.
    pub fn bind_route(&self, route_type: u32, address: Address) {
        lock(&self.routes).insert(route_type, address);
    }

    pub fn unbind_route(&self, route_type: u32) -> Option<Address> {
        lock(&self.routes).remove(&route_type)
    }

    pub fn route(&self, route_type: u32) -> Option<Address> {
        lock(&self.routes).get(&route_type).copied()
    }

    /// Enables roaming for this client. Returns the existing table if already enabled.
    pub fn create_roaming(&self, scene: &Scene, roaming_id: i64) -> Arc<SessionRoaming> {
        lock(&self.roaming)
            .get_or_insert_with(|| {
                Arc::new(SessionRoaming::new(
                    roaming_id,
                    self.address,
                    scene.config().lock.wait_timeout(),
                ))
            })
            .clone()
    }

    pub fn roaming(&self) -> Option<Arc<SessionRoaming>> {
        lock(&self.roaming).clone()
    }
}

/// The gate sessions of one scene, by session id and by session entity address.
#[derive(Default)]
pub struct GateComponent {
    by_id: Mutex<HashMap<u64, Arc<GateSession>>>,
    by_address: Mutex<HashMap<Address, Arc<GateSession>>>,
}

impl GateComponent {
    pub fn of(scene: &Scene) -> Arc<Self> {
        scene.component_or_insert_with(Self::default)
    }

    pub fn get(&self, session_id: u64) -> Option<Arc<GateSession>> {
        lock(&self.by_id).get(&session_id).cloned()
    }

    pub fn by_address(&self, address: Address) -> Option<Arc<GateSession>> {
        lock(&self.by_address).get(&address).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.by_id).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.by_id).is_empty()
    }

    fn insert(&self, gate: Arc<GateSession>) {
        lock(&self.by_address).insert(gate.address, Arc::clone(&gate));
        lock(&self.by_id).insert(gate.id(), gate);
    }

    fn remove(&self, session_id: u64) -> Option<Arc<GateSession>> {
        let gate = lock(&self.by_id).remove(&session_id)?;
        lock(&self.by_address).remove(&gate.address);
        Some(gate)
    }
}

impl Scene {
    /// Binds a client connection to this scene.
    pub fn accept(&self, session: Arc<dyn Session>) -> Arc<GateSession> {
        let address = self.add_entity(Arc::new(SessionEntity {
            session: Arc::clone(&session),
        }));
        let gate = Arc::new(GateSession {
            session,
            address,
            addressable: Mutex::new(None),
            routes: Mutex::new(HashMap::new()),
            roaming: Mutex::new(None),
        });
        GateComponent::of(self).insert(Arc::clone(&gate));
        info!(scene = %self.id(), session = gate.id(), %address, "Client session accepted");
        gate
    }

    pub fn gate_session(&self, session_id: u64) -> Option<Arc<GateSession>> {
        GateComponent::of(self).get(session_id)
    }

    /// Releases a client connection: unlinks its roaming termini and removes its session
    /// entity. Unknown ids are ignored.
    pub async fn close_session(&self, session_id: u64) {
        let Some(gate) = GateComponent::of(self).remove(session_id) else {
            return;
        };
        if let Some(roaming) = gate.roaming() {
            if let Err(e) = roaming.unlink(self, 0, true).await {
                warn!(scene = %self.id(), session = session_id, error = %e, "Unlinking roaming on close failed");
            }
            roaming.dispose();
        }
        self.remove_entity(gate.address);
        info!(scene = %self.id(), session = session_id, "Client session closed");
    }
}

/// Reply path for frames forwarded on behalf of a client: presents as inner traffic to the
/// target scene and hands every reply to the client connection.
pub struct RelaySession {
    id: u64,
    client: Arc<dyn Session>,
}

impl RelaySession {
    pub fn new(client: Arc<dyn Session>) -> Self {
        Self {
            id: next_session_id(),
            client,
        }
    }
}

impl Session for RelaySession {
    fn id(&self) -> u64 {
        self.id
    }

    fn kind(&self) -> SessionKind {
        SessionKind::Inner
    }

    fn send(&self, frame: Frame) {
        self.client.send(frame);
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }
}

/// Resolves an outer addressable, custom-route or roaming frame through the client's links.
pub(crate) fn route_outer(scene: &Scene, session: Arc<dyn Session>, frame: Frame, class: Classification) {
    let dispatcher = Arc::clone(scene.dispatcher());
    let owes_reply = class.is_request() && frame.expects_reply();
    let fail = |code: ErrorCode| {
        if owes_reply {
            dispatcher.reply_failure(&session, frame.opcode, frame.rpc_id, code);
        }
    };

    let Some(gate) = scene.gate_session(session.id()) else {
        warn!(scene = %scene.id(), session = session.id(), opcode = %frame.opcode, "Outer frame from unbound session");
        fail(ErrorCode::NOT_FOUND_ROUTE);
        return;
    };

    match class.scope {
        Scope::Addressable => {
            let Some(key) = gate.addressable() else {
                debug!(scene = %scene.id(), session = gate.id(), "No addressable bound");
                fail(ErrorCode::NOT_FOUND_ROUTE);
                return;
            };
            let client = AddressableClient::new(scene);
            relay(scene, session, frame, owes_reply, move |opcode, payload| async move {
                if owes_reply {
                    client.call_raw(key, opcode, payload).await.map(Some).map_err(|e| e.code())
                } else {
                    client.send_raw(key, opcode, payload).await.map(|()| None).map_err(|e| e.code())
                }
            });
        }
        Scope::CustomRoute => {
            let route_type = match dispatcher.types().resolve(frame.opcode) {
                Ok(ty) => ty.route_type,
                Err(e) => {
                    warn!(scene = %scene.id(), opcode = %frame.opcode, error = %e, "Unresolvable custom-route message");
                    fail(ErrorCode::RPC_FAIL);
                    return;
                }
            };
            let Some(target) = gate.route(route_type) else {
                debug!(scene = %scene.id(), session = gate.id(), route_type, "No route bound");
                fail(ErrorCode::NOT_FOUND_ROUTE);
                return;
            };
            let mut forwarded = frame.clone();
            forwarded.address = target;
            let relay: Arc<dyn Session> = Arc::new(RelaySession::new(Arc::clone(&session)));
            if let Err(e) = scene.network().deliver(relay, forwarded) {
                warn!(scene = %scene.id(), %target, error = %e, "Custom route undeliverable");
                fail(ErrorCode::NOT_FOUND_ROUTE);
            }
        }
        Scope::Roaming => {
            let route_type = match dispatcher.types().resolve(frame.opcode) {
                Ok(ty) => ty.route_type,
                Err(e) => {
                    warn!(scene = %scene.id(), opcode = %frame.opcode, error = %e, "Unresolvable roaming message");
                    fail(ErrorCode::RPC_FAIL);
                    return;
                }
            };
            let Some(roaming) = gate.roaming() else {
                fail(ErrorCode::NOT_FOUND_ROAMING);
                return;
            };
            let target = scene.clone();
            relay(scene, session, frame, owes_reply, move |opcode, payload| async move {
                if owes_reply {
                    roaming.call(&target, route_type, opcode, payload).await.map(Some).map_err(|e| e.code())
                } else {
                    roaming.send_raw(&target, route_type, opcode, payload).await.map(|()| None).map_err(|e| e.code())
                }
            });
        }
        Scope::Direct | Scope::Address => {
            warn!(scene = %scene.id(), opcode = %frame.opcode, "Outer frame with inner scope");
            fail(ErrorCode::RPC_FAIL);
        }
    }
}

/// Runs `forward` as a gate job and relays its response to the client under the client's
/// rpc id.
fn relay<F, Fut>(scene: &Scene, session: Arc<dyn Session>, frame: Frame, owes_reply: bool, forward: F)
where
    F: FnOnce(crate::opcode::OpCode, bytes::Bytes) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<Option<Frame>, ErrorCode>> + Send + 'static,
{
    let dispatcher = Arc::clone(scene.dispatcher());
    let scene_id = scene.id();
    let Frame {
        opcode, rpc_id, payload, ..
    } = frame;
    scene.spawn(async move {
        match forward(opcode, payload).await {
            Ok(Some(mut response)) => {
                response.rpc_id = rpc_id;
                response.address = Address::NONE;
                session.send(response);
            }
            Ok(None) => {}
            Err(code) => {
                debug!(scene = %scene_id, %opcode, %code, "Relay failed");
                if owes_reply {
                    dispatcher.reply_failure(&session, opcode, rpc_id, code);
                }
            }
        }
    });
}
