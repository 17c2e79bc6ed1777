//! Gate-side bookkeeping of a client's roaming links.

use super::RoamingError;
use crate::address::{Address, SceneId};
use crate::lock::{CoroutineLock, LockGuard};
use crate::opcode::OpCode;
use crate::protocol::messages::*;
use crate::protocol::{ErrorCode, Frame, Message};
use crate::scene::Scene;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the terminus of one roaming type currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoamingLink {
    pub terminus_id: Address,
    /// Root address of the hosting scene.
    pub scene: Address,
}

/// Link table of one gate session, keyed by roaming type.
///
/// While a terminus transfers, its type is locked here and every lookup for that type
/// queues until the destination unlocks it with the new terminus id.
pub struct SessionRoaming {
    roaming_id: i64,
    session_address: Address,
    links: Mutex<HashMap<u32, RoamingLink>>,
    lock: CoroutineLock<u32>,
    held: Mutex<HashMap<u32, LockGuard<u32>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl SessionRoaming {
    pub fn new(roaming_id: i64, session_address: Address, wait_timeout: Duration) -> Self {
        Self {
            roaming_id,
            session_address,
            links: Mutex::new(HashMap::new()),
            lock: CoroutineLock::new(format!("roaming-{roaming_id}"), wait_timeout),
            held: Mutex::new(HashMap::new()),
        }
    }

    pub fn roaming_id(&self) -> i64 {
        self.roaming_id
    }

    /// Address of the gate session entity the termini forward client pushes to.
    pub fn session_address(&self) -> Address {
        self.session_address
    }

    pub fn linked(&self, roaming_type: u32) -> Option<RoamingLink> {
        lock(&self.links).get(&roaming_type).copied()
    }

    pub fn links(&self) -> Vec<(u32, RoamingLink)> {
        lock(&self.links).iter().map(|(t, l)| (*t, *l)).collect()
    }

    pub fn is_locked(&self, roaming_type: u32) -> bool {
        lock(&self.held).contains_key(&roaming_type)
    }

    /// Creates a terminus of `roaming_type` on `target_scene` for this client.
    #[tracing::instrument(skip(self, scene), fields(roaming_id = self.roaming_id))]
    pub async fn link(&self, scene: &Scene, target_scene: SceneId, roaming_type: u32) -> Result<Address, RoamingError> {
        if self.linked(roaming_type).is_some() {
            return Err(RoamingError::AlreadyLinked(roaming_type));
        }
        let request = LinkRoamingRequest {
            roaming_id: self.roaming_id,
            roaming_type,
            forward_scene: scene.address(),
            forward_session: self.session_address,
        };
        let target = Address::for_scene(target_scene);
        let response = scene.call(target, &request).await?;

        let mut links = lock(&self.links);
        if links.contains_key(&roaming_type) {
            return Err(RoamingError::AlreadyLinked(roaming_type));
        }
        links.insert(
            roaming_type,
            RoamingLink {
                terminus_id: response.terminus_id,
                scene: target,
            },
        );
        info!(%target_scene, terminus = %response.terminus_id, "Roaming link created");
        Ok(response.terminus_id)
    }

    /// Removes the link of `roaming_type`, or every link when `roaming_type` is zero.
    pub async fn unlink(&self, scene: &Scene, roaming_type: u32, dispose_entity: bool) -> Result<(), RoamingError> {
        let removed: Vec<(u32, RoamingLink)> = {
            let mut links = lock(&self.links);
            if roaming_type == 0 {
                links.drain().collect()
            } else {
                let link = links.remove(&roaming_type).ok_or(RoamingError::NotFound(roaming_type))?;
                vec![(roaming_type, link)]
            }
        };

        let mut first_error = None;
        for (kind, link) in removed {
            let request = UnLinkRoamingRequest {
                terminus_id: link.terminus_id,
                dispose_entity,
            };
            if let Err(e) = scene.call(link.scene, &request).await {
                warn!(roaming_id = self.roaming_id, roaming_type = kind, error = %e, "Unlink failed");
                first_error.get_or_insert(RoamingError::from(e));
            } else {
                debug!(roaming_id = self.roaming_id, roaming_type = kind, "Roaming unlinked");
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Freezes lookups of `roaming_type` until [`Self::unlock_terminus`].
    pub async fn lock_terminus(&self, roaming_type: u32) -> Result<(), RoamingError> {
        let guard = self.lock.wait(roaming_type).await?;
        lock(&self.held).insert(roaming_type, guard);
        debug!(roaming_id = self.roaming_id, roaming_type, "Terminus id locked");
        Ok(())
    }

    /// Points the link at its (possibly new) home and releases queued lookups.
    pub fn unlock_terminus(&self, roaming_type: u32, terminus_id: Address, target_scene: Address) -> Result<(), RoamingError> {
        let guard = lock(&self.held)
            .remove(&roaming_type)
            .ok_or(RoamingError::UnlockTerminus { roaming_type })?;
        {
            let mut links = lock(&self.links);
            let Some(link) = links.get_mut(&roaming_type) else {
                drop(links);
                guard.release();
                return Err(RoamingError::NotFound(roaming_type));
            };
            link.terminus_id = terminus_id;
            link.scene = target_scene;
        }
        guard.release();
        debug!(roaming_id = self.roaming_id, roaming_type, %terminus_id, "Terminus id unlocked");
        Ok(())
    }

    /// Current terminus of `roaming_type`, waiting out an in-flight transfer.
    pub async fn terminus_id(&self, roaming_type: u32) -> Result<Address, RoamingError> {
        let _guard = self.lock.wait(roaming_type).await?;
        self.linked(roaming_type)
            .map(|link| link.terminus_id)
            .ok_or(RoamingError::NotFound(roaming_type))
    }

    /// Forwards a client request to the terminus of `roaming_type`, retrying while the
    /// terminus is between scenes.
    pub async fn call(&self, scene: &Scene, roaming_type: u32, opcode: OpCode, payload: Bytes) -> Result<Frame, RoamingError> {
        let config = scene.config().roaming.clone();
        let mut attempt = 0;
        loop {
            let terminus_id = self.terminus_id(roaming_type).await?;
            let outcome = scene.call_raw(terminus_id, opcode, payload.clone()).await;
            let code = match &outcome {
                Ok(frame) => frame.response_code(),
                Err(e) => e.code(),
            };
            if code != ErrorCode::NOT_FOUND_ROUTE && code != ErrorCode::NOT_FOUND_ROAMING {
                return Ok(outcome?);
            }
            attempt += 1;
            if attempt > config.retry_count {
                warn!(roaming_id = self.roaming_id, roaming_type, %terminus_id, "Terminus unreachable");
                return Ok(outcome?);
            }
            tokio::time::sleep(config.retry_backoff()).await;
        }
    }

    /// Forwards a client message to the terminus of `roaming_type` once.
    pub async fn send_raw(&self, scene: &Scene, roaming_type: u32, opcode: OpCode, payload: Bytes) -> Result<(), RoamingError> {
        let terminus_id = self.terminus_id(roaming_type).await?;
        scene.send_frame(Frame::new(opcode, 0, terminus_id, payload))?;
        Ok(())
    }

    pub async fn send<M: Message>(&self, scene: &Scene, roaming_type: u32, message: &M) -> Result<(), RoamingError> {
        self.send_raw(scene, roaming_type, M::OPCODE, message.encode()?).await
    }

    /// Releases every queued lookup. Called when the gate session closes.
    pub fn dispose(&self) {
        lock(&self.held).clear();
        self.lock.dispose();
    }
}

impl std::fmt::Debug for SessionRoaming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRoaming")
            .field("roaming_id", &self.roaming_id)
            .field("links", &self.links())
            .finish()
    }
}
