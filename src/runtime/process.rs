use crate::address::SceneId;
use crate::config::RuntimeConfig;
use crate::dispatch::{HandlerSet, MessageDispatcher};
use crate::registry::RegistryError;
use crate::scene::{LoopbackTransport, Network, Scene, SceneError};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// One runtime process: a network, a dispatcher shared by all of its scenes, and the scenes.
///
/// The built-in directory and roaming handler sets are loaded on construction; application
/// handler sets are added with [`Process::load`] and can be replaced at runtime.
///
/// # Example
///
/// ```ignore
/// let process = Process::new("gate", RuntimeConfig::default())?;
/// process.load(game::handlers())?;
/// let scene = process.create_scene(SceneId::new(1, 1))?;
/// // ...
/// process.shutdown();
/// ```
pub struct Process {
    name: String,
    config: Arc<RuntimeConfig>,
    network: Network,
    dispatcher: Arc<MessageDispatcher>,
    scenes: Mutex<BTreeMap<SceneId, Scene>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Process {
    pub fn new(name: impl Into<String>, config: RuntimeConfig) -> Result<Self, RegistryError> {
        let name = name.into();
        let dispatcher = Arc::new(MessageDispatcher::new());
        dispatcher.load(crate::addressable::handlers())?;
        dispatcher.load(crate::roaming::handlers())?;
        info!(process = %name, "Process created");
        Ok(Self {
            network: Network::new(name.clone()),
            name,
            config: Arc::new(config),
            dispatcher,
            scenes: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Arc<RuntimeConfig> {
        &self.config
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn dispatcher(&self) -> &Arc<MessageDispatcher> {
        &self.dispatcher
    }

    /// Loads (or reloads) an application handler set into every scene of this process.
    pub fn load(&self, set: HandlerSet) -> Result<(), RegistryError> {
        self.dispatcher.load(set)
    }

    pub fn unload(&self, assembly: &str) {
        self.dispatcher.unload(assembly);
    }

    /// Starts a scene. Must be called from within a Tokio runtime.
    pub fn create_scene(&self, id: SceneId) -> Result<Scene, SceneError> {
        let mut scenes = lock(&self.scenes);
        if scenes.contains_key(&id) {
            return Err(SceneError::AlreadyExists(id));
        }
        let scene = Scene::start(
            id,
            Arc::clone(&self.config),
            Arc::clone(&self.dispatcher),
            self.network.clone(),
        );
        scenes.insert(id, scene.clone());
        Ok(scene)
    }

    pub fn scene(&self, id: SceneId) -> Option<Scene> {
        lock(&self.scenes).get(&id).cloned()
    }

    pub fn scenes(&self) -> Vec<Scene> {
        lock(&self.scenes).values().cloned().collect()
    }

    /// Disposes one scene. Returns false if it is not hosted here.
    pub fn dispose_scene(&self, id: SceneId) -> bool {
        let Some(scene) = lock(&self.scenes).remove(&id) else {
            return false;
        };
        scene.dispose();
        true
    }

    /// Routes frames for `scene` to `peer` (a process hosting that scene).
    pub fn route_via(&self, scene: SceneId, peer: &Process) {
        self.network.add_route(scene, Arc::new(LoopbackTransport::new(&peer.network)));
    }

    /// Connects two processes both ways for the scenes each currently hosts.
    pub fn connect(&self, peer: &Process) {
        for scene in peer.network.local_scenes() {
            self.route_via(scene, peer);
        }
        for scene in self.network.local_scenes() {
            peer.route_via(scene, self);
        }
        info!(process = %self.name, peer = %peer.name, "Processes connected");
    }

    /// Disposes every scene and drops all routes.
    pub fn shutdown(&self) {
        let scenes = std::mem::take(&mut *lock(&self.scenes));
        let count = scenes.len();
        for scene in scenes.into_values() {
            scene.dispose();
        }
        self.network.clear();
        info!(process = %self.name, scenes = count, "Process shut down");
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if !lock(&self.scenes).is_empty() {
            self.shutdown();
        }
    }
}
