//! # Terminus
//!
//! The server-side end of a roaming link: one per (client, roaming type), hosted on the scene
//! that currently serves that client for that type. The gate scene that terminates the
//! client connection is the terminus's *forward scene*; it holds the link table that outer
//! roaming frames are routed by.
//!
//! ## Transfer protocol
//!
//! ```text
//!  origin                     gate (forward scene)              destination
//!    |-- LockTerminusId ---------->|  lookups for the type queue
//!    |-- TransferTerminus(snapshot) ------------------------------>|
//!    |                             |<----- UnLockTerminusId(new id) |  restore + register
//!    |<------------------------------------------------- response --|
//!  detach                          |  lookups resume at new id
//! ```
//!
//! Any failure after the lock attempt makes the origin send `UnLockTerminusId` with its own
//! id, so the gate never stays locked.

use super::{RoamingError, RoamingObject};
use crate::address::{Address, SceneId};
use crate::lock::CoroutineLock;
use crate::opcode::OpCode;
use crate::protocol::messages::*;
use crate::protocol::{ErrorCode, Frame, Message, Request};
use crate::scene::{decode_response, Scene};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminusState {
    Attached,
    Locking,
    Locked,
    Transferring,
    Detached,
}

pub struct Terminus {
    roaming_id: i64,
    roaming_type: u32,
    terminus_id: Address,
    forward_scene: Address,
    forward_session: Mutex<Address>,
    state: Mutex<TerminusState>,
    entity: Mutex<Option<Arc<dyn RoamingObject>>>,
    peers: Mutex<HashMap<u32, Address>>,
    message_lock: CoroutineLock<u32>,
    disposed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Terminus {
    fn new(
        scene: &Scene,
        roaming_id: i64,
        roaming_type: u32,
        forward_scene: Address,
        forward_session: Address,
        entity: Option<Arc<dyn RoamingObject>>,
    ) -> Self {
        let terminus_id = scene.new_address();
        Self {
            roaming_id,
            roaming_type,
            terminus_id,
            forward_scene,
            forward_session: Mutex::new(forward_session),
            state: Mutex::new(TerminusState::Attached),
            entity: Mutex::new(entity),
            peers: Mutex::new(HashMap::new()),
            message_lock: CoroutineLock::new(format!("terminus-{terminus_id}"), scene.config().lock.wait_timeout()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Current address of the roaming entity. Changes on every transfer.
    pub fn terminus_id(&self) -> Address {
        self.terminus_id
    }

    pub fn roaming_id(&self) -> i64 {
        self.roaming_id
    }

    pub fn roaming_type(&self) -> u32 {
        self.roaming_type
    }

    pub fn forward_scene(&self) -> Address {
        self.forward_scene
    }

    /// Address of the client's session entity on the gate.
    pub fn forward_session(&self) -> Address {
        *lock(&self.forward_session)
    }

    pub(crate) fn set_forward_session(&self, session: Address) {
        *lock(&self.forward_session) = session;
    }

    pub fn state(&self) -> TerminusState {
        *lock(&self.state)
    }

    fn set_state(&self, state: TerminusState) {
        *lock(&self.state) = state;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn entity(&self) -> Option<Arc<dyn RoamingObject>> {
        lock(&self.entity).clone()
    }

    pub fn entity_as<E: super::RoamingEntity>(&self) -> Option<Arc<E>> {
        self.entity()?.into_any().downcast::<E>().ok()
    }

    /// Links `entity` to this terminus. Frames for the terminus id are routed to it from now on.
    pub fn link_entity<E: super::RoamingEntity>(&self, scene: &Scene, entity: Arc<E>) -> Result<(), RoamingError> {
        {
            let mut slot = lock(&self.entity);
            if slot.is_some() {
                return Err(RoamingError::AlreadyLinked(self.roaming_type));
            }
            *slot = Some(entity.clone() as Arc<dyn RoamingObject>);
        }
        scene.insert_entity(self.terminus_id, entity);
        debug!(terminus = %self.terminus_id, entity_type = E::ENTITY_TYPE, "Entity linked");
        Ok(())
    }

    fn snapshot(&self) -> Result<TerminusSnapshot, RoamingError> {
        let entity = self.entity();
        let (entity_type, entity) = match entity {
            Some(entity) => (Some(entity.entity_type().to_string()), Some(entity.encode()?)),
            None => (None, None),
        };
        Ok(TerminusSnapshot {
            roaming_id: self.roaming_id,
            roaming_type: self.roaming_type,
            forward_scene: self.forward_scene,
            forward_session: self.forward_session(),
            entity_type,
            entity,
        })
    }

    pub(crate) fn detach(&self) {
        self.disposed.store(true, Ordering::Release);
        self.set_state(TerminusState::Detached);
        lock(&self.peers).clear();
        self.message_lock.dispose();
    }

    // --- Transfer ---

    /// Moves this terminus and its entity to `target`.
    ///
    /// On success the local copy is detached and removed from `scene`.
    #[tracing::instrument(skip(self, scene), fields(terminus = %self.terminus_id, roaming_type = self.roaming_type))]
    pub async fn start_transfer(&self, scene: &Scene, target: SceneId) -> Result<(), RoamingError> {
        if target == scene.id() {
            warn!("Transfer to the hosting scene refused");
            return Err(RoamingError::SameScene(target));
        }
        {
            let mut state = lock(&self.state);
            if *state != TerminusState::Attached {
                return Err(RoamingError::Busy(*state));
            }
            *state = TerminusState::Locking;
        }

        let request = LockTerminusIdRequest {
            session: self.forward_session(),
            roaming_type: self.roaming_type,
        };
        if let Err(source) = scene.call(self.forward_scene, &request).await {
            warn!(error = %source, "Locking terminus id failed");
            self.rollback(scene).await;
            return Err(RoamingError::LockTerminus {
                roaming_type: self.roaming_type,
                source,
            });
        }
        self.set_state(TerminusState::Locked);

        let outcome = async {
            let snapshot = self.snapshot()?;
            self.set_state(TerminusState::Transferring);
            scene
                .call(Address::for_scene(target), &TransferTerminusRequest { snapshot })
                .await
                .map_err(RoamingError::Transfer)?;
            Ok::<(), RoamingError>(())
        }
        .await;

        match outcome {
            Ok(()) => {
                super::TerminusComponent::of(scene).remove(scene, self.terminus_id, true);
                info!(%target, "Terminus transferred");
                Ok(())
            }
            Err(e) => {
                warn!(%target, error = %e, "Terminus transfer failed, rolling back");
                self.rollback(scene).await;
                Err(e)
            }
        }
    }

    /// Unlocks the gate pointing at this copy and returns to `Attached`.
    async fn rollback(&self, scene: &Scene) {
        if let Err(e) = self.unlock(scene).await {
            error!(terminus = %self.terminus_id, error = %e, "Unlock after failed transfer failed");
        }
        self.set_state(TerminusState::Attached);
    }

    async fn unlock(&self, scene: &Scene) -> Result<(), RoamingError> {
        let request = UnLockTerminusIdRequest {
            session: self.forward_session(),
            roaming_type: self.roaming_type,
            terminus_id: self.terminus_id,
            target_scene: scene.address(),
        };
        scene.call(self.forward_scene, &request).await.map_err(|e| {
            warn!(terminus = %self.terminus_id, error = %e, "UnLockTerminusId failed");
            RoamingError::UnlockTerminus {
                roaming_type: self.roaming_type,
            }
        })?;
        Ok(())
    }

    /// Re-creates a transferred terminus on `scene` and points the gate at it.
    ///
    /// If the gate cannot be unlocked the restored copy is removed again.
    pub(crate) async fn transfer_complete(scene: &Scene, snapshot: TerminusSnapshot) -> Result<Arc<Terminus>, RoamingError> {
        let entity = match (&snapshot.entity_type, &snapshot.entity) {
            (Some(entity_type), Some(bytes)) => {
                let loader = scene
                    .dispatcher()
                    .loader(entity_type)
                    .ok_or_else(|| RoamingError::UnknownEntityType(entity_type.clone()))?;
                Some(loader(bytes)?)
            }
            _ => None,
        };

        let terminus = Arc::new(Terminus::new(
            scene,
            snapshot.roaming_id,
            snapshot.roaming_type,
            snapshot.forward_scene,
            snapshot.forward_session,
            entity,
        ));
        let component = super::TerminusComponent::of(scene);
        component.insert(scene, Arc::clone(&terminus));

        if let Err(e) = terminus.unlock(scene).await {
            component.remove(scene, terminus.terminus_id, true);
            return Err(e);
        }
        info!(scene = %scene.id(), terminus = %terminus.terminus_id, roaming_id = terminus.roaming_id, "Terminus restored");
        Ok(terminus)
    }

    // --- Messaging ---

    async fn peer(&self, scene: &Scene, roaming_type: u32) -> Result<Address, RoamingError> {
        if let Some(peer) = lock(&self.peers).get(&roaming_type).copied() {
            return Ok(peer);
        }
        let request = GetTerminusIdRequest {
            session: self.forward_session(),
            roaming_type,
        };
        let terminus_id = match scene.call(self.forward_scene, &request).await {
            Ok(response) if !response.terminus_id.is_none() => response.terminus_id,
            Ok(_) => return Err(RoamingError::NotFound(roaming_type)),
            Err(e) if e.code() == ErrorCode::NOT_FOUND_ROAMING => return Err(RoamingError::NotFound(roaming_type)),
            Err(e) => return Err(e.into()),
        };
        lock(&self.peers).insert(roaming_type, terminus_id);
        Ok(terminus_id)
    }

    /// Calls the terminus of another roaming type linked to the same client.
    #[tracing::instrument(skip(self, scene, payload), fields(terminus = %self.terminus_id))]
    pub async fn call_raw(&self, scene: &Scene, roaming_type: u32, opcode: OpCode, payload: Bytes) -> Result<Frame, RoamingError> {
        if self.is_disposed() || roaming_type == self.roaming_type {
            return Err(RoamingError::NotFound(roaming_type));
        }
        let _guard = self.message_lock.wait(roaming_type).await?;
        let config = scene.config().roaming.clone();
        let mut attempt = 0;

        loop {
            if self.is_disposed() {
                return Err(RoamingError::Moved);
            }
            let peer = self.peer(scene, roaming_type).await?;
            let outcome = scene.call_raw(peer, opcode, payload.clone()).await;
            if self.is_disposed() {
                return Err(RoamingError::Moved);
            }

            let code = match &outcome {
                Ok(frame) => frame.response_code(),
                Err(e) => e.code(),
            };
            if code != ErrorCode::NOT_FOUND_ROUTE && code != ErrorCode::NOT_FOUND_ROAMING {
                return Ok(outcome?);
            }

            lock(&self.peers).remove(&roaming_type);
            attempt += 1;
            if attempt > config.retry_count {
                error!(%peer, attempts = attempt, "Roaming peer unreachable");
                return Ok(outcome?);
            }
            debug!(%peer, attempt, %code, "Roaming peer not found, retrying");
            tokio::time::sleep(config.retry_backoff()).await;
        }
    }

    pub async fn call<R: Request>(&self, scene: &Scene, roaming_type: u32, request: &R) -> Result<R::Response, RoamingError> {
        let frame = self.call_raw(scene, roaming_type, R::OPCODE, request.encode()?).await?;
        Ok(decode_response::<R::Response>(&frame)?)
    }

    /// Resolves the peer of `roaming_type` once and sends `message` to it.
    pub async fn send<M: Message>(&self, scene: &Scene, roaming_type: u32, message: &M) -> Result<(), RoamingError> {
        if self.is_disposed() || roaming_type == self.roaming_type {
            return Err(RoamingError::NotFound(roaming_type));
        }
        let peer = self.peer(scene, roaming_type).await?;
        scene.send(peer, message)?;
        Ok(())
    }

    /// Pushes `message` to the client through its gate session.
    pub fn send_to_client<M: Message>(&self, scene: &Scene, message: &M) -> Result<(), RoamingError> {
        scene.send(self.forward_session(), message)?;
        Ok(())
    }
}

impl std::fmt::Debug for Terminus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminus")
            .field("terminus_id", &self.terminus_id)
            .field("roaming_id", &self.roaming_id)
            .field("roaming_type", &self.roaming_type)
            .field("state", &self.state())
            .finish()
    }
}

/// The termini hosted by one scene.
#[derive(Default)]
pub struct TerminusComponent {
    termini: Mutex<HashMap<Address, Arc<Terminus>>>,
}

impl TerminusComponent {
    pub fn of(scene: &Scene) -> Arc<Self> {
        scene.component_or_insert_with(Self::default)
    }

    pub fn get(&self, terminus_id: Address) -> Option<Arc<Terminus>> {
        lock(&self.termini).get(&terminus_id).cloned()
    }

    pub fn find(&self, roaming_id: i64, roaming_type: u32) -> Option<Arc<Terminus>> {
        lock(&self.termini)
            .values()
            .find(|t| t.roaming_id == roaming_id && t.roaming_type == roaming_type)
            .cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.termini).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.termini).is_empty()
    }

    /// Creates the terminus for a new link.
    pub fn link(&self, scene: &Scene, request: &LinkRoamingRequest) -> Result<Arc<Terminus>, RoamingError> {
        if self.find(request.roaming_id, request.roaming_type).is_some() {
            return Err(RoamingError::AlreadyLinked(request.roaming_type));
        }
        let terminus = Arc::new(Terminus::new(
            scene,
            request.roaming_id,
            request.roaming_type,
            request.forward_scene,
            request.forward_session,
            None,
        ));
        self.insert(scene, Arc::clone(&terminus));
        info!(
            scene = %scene.id(),
            terminus = %terminus.terminus_id,
            roaming_id = request.roaming_id,
            roaming_type = request.roaming_type,
            "Roaming linked"
        );
        Ok(terminus)
    }

    pub(crate) fn insert(&self, scene: &Scene, terminus: Arc<Terminus>) {
        let id = terminus.terminus_id;
        match terminus.entity() {
            Some(entity) => {
                let entity_type = entity.entity_type();
                scene.entities().insert_value(id, entity_type, entity.into_any());
            }
            None => {
                scene.insert_entity(id, Arc::clone(&terminus));
            }
        }
        lock(&self.termini).insert(id, terminus);
    }

    /// Detaches and forgets a terminus. The linked entity's binding is removed with
    /// `dispose_entity`; a terminus without entity is always unbound.
    pub fn remove(&self, scene: &Scene, terminus_id: Address, dispose_entity: bool) -> Option<Arc<Terminus>> {
        let terminus = lock(&self.termini).remove(&terminus_id)?;
        if dispose_entity || terminus.entity().is_none() {
            scene.remove_entity(terminus_id);
        }
        terminus.detach();
        debug!(scene = %scene.id(), terminus = %terminus_id, "Terminus removed");
        Some(terminus)
    }
}
