//! Process-level routing between scenes.
//!
//! The route table is an `ArcSwap` snapshot: scenes and peers are added or removed by
//! publishing a new table while deliveries keep reading the previous one.

use super::{NetworkError, Scene, Session};
use crate::address::SceneId;
use crate::protocol::Frame;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Delivery to scenes hosted outside this process. The byte-level transport lives behind it.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, scene: SceneId, reply_to: Arc<dyn Session>, frame: Frame) -> Result<(), NetworkError>;
}

#[derive(Clone)]
enum Route {
    Local(Scene),
    Remote(Arc<dyn Transport>),
}

struct NetworkInner {
    name: String,
    routes: ArcSwap<HashMap<SceneId, Route>>,
}

/// Routes frames by the scene id embedded in their address.
#[derive(Clone)]
pub struct Network {
    inner: Arc<NetworkInner>,
}

impl Network {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                name: name.into(),
                routes: ArcSwap::from_pointee(HashMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn add_scene(&self, scene: Scene) {
        let id = scene.id();
        self.inner.routes.rcu(|routes| {
            let mut next = HashMap::clone(routes);
            next.insert(id, Route::Local(scene.clone()));
            next
        });
    }

    pub(crate) fn remove_scene(&self, id: SceneId) {
        self.inner.routes.rcu(|routes| {
            let mut next = HashMap::clone(routes);
            if matches!(next.get(&id), Some(Route::Local(_))) {
                next.remove(&id);
            }
            next
        });
    }

    /// Sends frames for `scene` through `transport`. Local scenes keep priority.
    pub fn add_route(&self, scene: SceneId, transport: Arc<dyn Transport>) {
        self.inner.routes.rcu(|routes| {
            let mut next = HashMap::clone(routes);
            if !matches!(next.get(&scene), Some(Route::Local(_))) {
                next.insert(scene, Route::Remote(Arc::clone(&transport)));
            }
            next
        });
    }

    pub fn local_scenes(&self) -> Vec<SceneId> {
        self.inner
            .routes
            .load()
            .iter()
            .filter(|(_, route)| matches!(route, Route::Local(_)))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn local_scene(&self, id: SceneId) -> Option<Scene> {
        match self.inner.routes.load().get(&id) {
            Some(Route::Local(scene)) => Some(scene.clone()),
            _ => None,
        }
    }

    /// Hands `frame` to the scene owning `frame.address`, locally or through a transport.
    /// The frame is moved unchanged; `reply_to` travels with it.
    pub fn deliver(&self, reply_to: Arc<dyn Session>, frame: Frame) -> Result<(), NetworkError> {
        let target = frame.address.scene_id();
        let route = self.inner.routes.load().get(&target).cloned();
        match route {
            Some(Route::Local(scene)) => {
                trace!(network = %self.inner.name, scene = %target, opcode = %frame.opcode, "Local delivery");
                scene.receive(reply_to, frame);
                Ok(())
            }
            Some(Route::Remote(transport)) => {
                debug!(network = %self.inner.name, scene = %target, rpc_id = frame.rpc_id, "Forwarding to peer");
                transport.send(target, reply_to, frame)
            }
            None => Err(NetworkError::NoRoute(target)),
        }
    }

    pub(crate) fn clear(&self) {
        self.inner.routes.store(Arc::new(HashMap::new()));
    }

    fn downgrade(&self) -> Weak<NetworkInner> {
        Arc::downgrade(&self.inner)
    }
}

/// In-memory transport into another process's [`Network`].
pub struct LoopbackTransport {
    peer: Weak<NetworkInner>,
}

impl LoopbackTransport {
    pub fn new(peer: &Network) -> Self {
        Self { peer: peer.downgrade() }
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, scene: SceneId, reply_to: Arc<dyn Session>, frame: Frame) -> Result<(), NetworkError> {
        let inner = self.peer.upgrade().ok_or(NetworkError::PeerGone(scene))?;
        Network { inner }.deliver(reply_to, frame)
    }
}
