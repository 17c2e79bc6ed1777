//! # Scene
//!
//! A scene is one single-logical-thread execution context hosting many entities.
//!
//! # Architecture Note
//! Every scene owns exactly one driver task. All work for the scene (handler invocations,
//! lock continuations, RPC continuations, [`Scene::run`] closures) is posted to its job queue
//! and polled by that driver through a `FuturesUnordered`. Two jobs of the same scene therefore
//! never execute at the same time, while different scenes run on different Tokio workers.
//!
//! Jobs may suspend (lock grant, RPC response, timer). Anything a job read before suspending
//! can be stale afterwards, which is why routed continuations re-check the entity generation.

use super::{EntityEntry, EntityTable, Network, SceneError, SceneSession, Session};
use crate::address::{Address, AddressFactory, SceneId};
use crate::config::RuntimeConfig;
use crate::dispatch::MessageDispatcher;
use crate::lock::{CoroutineLock, Disposable, FlowLock, LockKey};
use crate::opcode::OpCode;
use crate::protocol::messages::{DefaultResponse, RouteResponse};
use crate::protocol::{Frame, Message, Request, Response};
use crate::rpc::{RpcCorrelator, RpcError};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Job = BoxFuture<'static, ()>;

struct SceneInner {
    id: SceneId,
    address: Address,
    config: Arc<RuntimeConfig>,
    factory: AddressFactory,
    entities: EntityTable,
    correlator: RpcCorrelator,
    dispatcher: Arc<MessageDispatcher>,
    network: Network,
    route_lock: CoroutineLock<Address>,
    owned_locks: Mutex<Vec<Box<dyn Disposable>>>,
    components: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    jobs: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

/// Handle to a scene. Cloning is cheap; all clones refer to the same scene.
#[derive(Clone)]
pub struct Scene {
    inner: Arc<SceneInner>,
}

impl Scene {
    /// Creates the scene, spawns its driver and registers it on `network`.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn start(
        id: SceneId,
        config: Arc<RuntimeConfig>,
        dispatcher: Arc<MessageDispatcher>,
        network: Network,
    ) -> Scene {
        let (sender, receiver) = mpsc::unbounded_channel();
        let scene = Scene {
            inner: Arc::new(SceneInner {
                id,
                address: Address::for_scene(id),
                route_lock: CoroutineLock::new(format!("route-{id}"), config.lock.wait_timeout()),
                config,
                factory: AddressFactory::new(id),
                entities: EntityTable::new(),
                correlator: RpcCorrelator::new(id),
                dispatcher,
                network: network.clone(),
                owned_locks: Mutex::new(Vec::new()),
                components: Mutex::new(HashMap::new()),
                jobs: Mutex::new(Some(sender)),
                driver: Mutex::new(None),
                disposed: AtomicBool::new(false),
            }),
        };

        let handle = tokio::spawn(drive(id, receiver));
        *lock(&scene.inner.driver) = Some(handle);
        network.add_scene(scene.clone());
        info!(scene = %id, address = %scene.address(), "Scene started");
        scene
    }

    pub fn id(&self) -> SceneId {
        self.inner.id
    }

    /// The scene root address, where scene-level services are reached.
    pub fn address(&self) -> Address {
        self.inner.address
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn network(&self) -> &Network {
        &self.inner.network
    }

    pub fn dispatcher(&self) -> &Arc<MessageDispatcher> {
        &self.inner.dispatcher
    }

    pub fn correlator(&self) -> &RpcCorrelator {
        &self.inner.correlator
    }

    pub fn entities(&self) -> &EntityTable {
        &self.inner.entities
    }

    /// The lock serializing routed frames per destination address.
    pub fn route_lock(&self) -> &CoroutineLock<Address> {
        &self.inner.route_lock
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Session that routes replies back to this scene.
    pub fn reply_session(&self) -> Arc<dyn Session> {
        Arc::new(SceneSession::new(self.address(), self.network().clone()))
    }

    // --- Jobs ---

    /// Posts `job` to the scene queue. Jobs posted after disposal are dropped.
    pub fn spawn<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = lock(&self.inner.jobs).clone();
        match sender {
            Some(sender) if sender.send(Box::pin(job)).is_ok() => {}
            _ => debug!(scene = %self.id(), "Job dropped on disposed scene"),
        }
    }

    /// Runs `f` on the scene and returns its output to the caller.
    pub async fn run<F, Fut, T>(&self, f: F) -> Result<T, SceneError>
    where
        F: FnOnce(Scene) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, outcome) = oneshot::channel();
        let scene = self.clone();
        self.spawn(async move {
            let _ = reply.send(f(scene).await);
        });
        outcome.await.map_err(|_| SceneError::Disposed(self.id()))
    }

    /// Entry point for every frame addressed to this scene.
    pub fn receive(&self, session: Arc<dyn Session>, frame: Frame) {
        if self.is_disposed() {
            debug!(scene = %self.id(), opcode = %frame.opcode, "Frame for disposed scene dropped");
            return;
        }
        let _ = self.inner.dispatcher.dispatch(self, session, frame);
    }

    // --- Entities ---

    pub fn new_address(&self) -> Address {
        self.inner.factory.create()
    }

    /// Binds `entity` to a fresh address.
    pub fn add_entity<E: Any + Send + Sync>(&self, entity: Arc<E>) -> Address {
        let address = self.new_address();
        self.inner.entities.insert(address, entity);
        debug!(scene = %self.id(), %address, "Entity added");
        address
    }

    /// Binds `entity` to a known address, returning the entry's generation.
    pub fn insert_entity<E: Any + Send + Sync>(&self, address: Address, entity: Arc<E>) -> u64 {
        self.inner.entities.insert(address, entity)
    }

    pub fn remove_entity(&self, address: Address) -> bool {
        let removed = self.inner.entities.remove(address).is_some();
        if removed {
            debug!(scene = %self.id(), %address, "Entity removed");
        }
        removed
    }

    pub fn entity<E: Any + Send + Sync>(&self, address: Address) -> Option<Arc<E>> {
        self.inner.entities.get(address)?.downcast::<E>()
    }

    /// The table entry for `address`. The scene root resolves to the scene itself.
    pub fn entry(&self, address: Address) -> Option<EntityEntry> {
        if address == self.address() {
            return Some(EntityEntry::new(address, 0, "Scene", Arc::new(self.clone())));
        }
        self.inner.entities.get(address)
    }

    // --- Components ---

    /// Attaches a scene-wide service. Replaces any component of the same type.
    pub fn add_component<T: Any + Send + Sync>(&self, component: Arc<T>) -> Arc<T> {
        lock(&self.inner.components).insert(TypeId::of::<T>(), component.clone());
        component
    }

    pub fn component<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let component = lock(&self.inner.components).get(&TypeId::of::<T>())?.clone();
        component.downcast::<T>().ok()
    }

    /// Returns the component of type `T`, creating it with `init` on first use.
    pub fn component_or_insert_with<T, F>(&self, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let mut components = lock(&self.inner.components);
        if let Some(existing) = components.get(&TypeId::of::<T>()) {
            if let Ok(component) = existing.clone().downcast::<T>() {
                return component;
            }
        }
        let component = Arc::new(init());
        components.insert(TypeId::of::<T>(), component.clone());
        component
    }

    /// A lock disposed together with this scene.
    pub fn new_lock<K: LockKey>(&self, name: impl Into<String>) -> CoroutineLock<K> {
        let created = CoroutineLock::new(name, self.config().lock.wait_timeout());
        lock(&self.inner.owned_locks).push(Box::new(created.clone()));
        created
    }

    /// A flow lock sized by `lock.flow_slots`, closed together with this scene.
    pub fn new_flow_lock(&self, name: impl Into<String>) -> Arc<FlowLock> {
        let lock_config = &self.config().lock;
        let created = Arc::new(FlowLock::new(name, lock_config.flow_slots, lock_config.wait_timeout()));
        lock(&self.inner.owned_locks).push(Box::new(Arc::clone(&created)));
        created
    }

    // --- Messaging ---

    /// Fire-and-forget send to `address`.
    pub fn send<M: Message>(&self, address: Address, message: &M) -> Result<(), RpcError> {
        self.send_frame(Frame::encode(message, 0, address)?)
    }

    /// Routes an already encoded frame. Replies, if any, come back to this scene.
    pub fn send_frame(&self, frame: Frame) -> Result<(), RpcError> {
        let target = frame.address;
        self.inner
            .network
            .deliver(self.reply_session(), frame)
            .map_err(|source| RpcError::Unroutable { target, source })
    }

    /// Sends `request` to `address` and waits for its typed response.
    ///
    /// A response carrying a non-zero error code fails with [`RpcError::Remote`].
    pub async fn call<R: Request>(&self, address: Address, request: &R) -> Result<R::Response, RpcError> {
        let frame = self.call_raw(address, R::OPCODE, request.encode()?).await?;
        decode_response::<R::Response>(&frame)
    }

    /// Sends an encoded request and waits for the raw response frame.
    pub async fn call_raw(&self, address: Address, opcode: OpCode, payload: Bytes) -> Result<Frame, RpcError> {
        let (rpc_id, receiver) = self.inner.correlator.register(opcode, address)?;
        let frame = Frame::new(opcode, rpc_id, address, payload);
        if let Err(source) = self.inner.network.deliver(self.reply_session(), frame) {
            self.inner.correlator.cancel(rpc_id);
            return Err(RpcError::Unroutable { target: address, source });
        }
        self.inner
            .correlator
            .wait(rpc_id, address, receiver, self.config().rpc.call_timeout())
            .await
    }

    // --- Lifecycle ---

    /// Tears the scene down: fails pending calls, releases every lock waiter, drops queued
    /// jobs and leaves the network. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let id = self.id();
        self.inner.network.remove_scene(id);
        let failed = self.inner.correlator.dispose();

        self.inner.route_lock.dispose();
        let locks = std::mem::take(&mut *lock(&self.inner.owned_locks));
        for owned in &locks {
            owned.dispose();
        }

        let entities = self.inner.entities.len();
        self.inner.entities.clear();
        lock(&self.inner.components).clear();

        lock(&self.inner.jobs).take();
        if let Some(driver) = lock(&self.inner.driver).take() {
            driver.abort();
        }
        info!(scene = %id, failed_calls = failed, locks = locks.len(), entities, "Scene disposed");
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene").field("id", &self.id()).finish()
    }
}

/// Decodes a response frame, surfacing in-band error codes as [`RpcError::Remote`].
pub(crate) fn decode_response<T: Response>(frame: &Frame) -> Result<T, RpcError> {
    if frame.opcode != T::OPCODE {
        // Routing failures come back in the generic shapes.
        if frame.opcode == RouteResponse::OPCODE || frame.opcode == DefaultResponse::OPCODE {
            let fallback = RouteResponse::decode(&frame.payload)?;
            if !fallback.error_code.is_ok() {
                return Err(RpcError::Remote(fallback.error_code));
            }
        }
        return Err(RpcError::UnexpectedResponse {
            expected: T::OPCODE,
            actual: frame.opcode,
        });
    }
    let response = T::decode(&frame.payload)?;
    let code = response.error_code();
    if !code.is_ok() {
        return Err(RpcError::Remote(code));
    }
    Ok(response)
}

async fn drive(scene: SceneId, mut jobs: mpsc::UnboundedReceiver<Job>) {
    let mut running: FuturesUnordered<Job> = FuturesUnordered::new();
    loop {
        tokio::select! {
            job = jobs.recv() => match job {
                Some(job) => running.push(job),
                None => break,
            },
            Some(()) = running.next(), if !running.is_empty() => {}
        }
    }
    if !running.is_empty() {
        warn!(%scene, abandoned = running.len(), "Scene driver stopped with jobs in flight");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
