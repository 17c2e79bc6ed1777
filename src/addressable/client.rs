//! # AddressableClient
//!
//! Reaches an addressable entity by its stable key from any scene: resolves the current owner
//! through the directory and retries while the owner is between scenes.

use super::AddressableError;
use crate::address::Address;
use crate::lock::CoroutineLock;
use crate::opcode::OpCode;
use crate::protocol::messages::*;
use crate::protocol::{ErrorCode, Frame, Message, Request};
use crate::rpc::RpcError;
use crate::scene::{decode_response, Scene};
use bytes::Bytes;
use tracing::{debug, warn};

/// Per-scene lock serializing client traffic per key.
struct ClientLock(CoroutineLock<i64>);

/// Directory client bound to the calling scene.
#[derive(Clone)]
pub struct AddressableClient {
    scene: Scene,
    lock: CoroutineLock<i64>,
}

impl AddressableClient {
    pub fn new(scene: &Scene) -> Self {
        let lock = scene
            .component_or_insert_with(|| ClientLock(scene.new_lock("addressable-client")))
            .0
            .clone();
        Self {
            scene: scene.clone(),
            lock,
        }
    }

    /// Root address of the directory scene responsible for `key`.
    pub fn directory(&self, key: i64) -> Result<Address, AddressableError> {
        let scenes = &self.scene.config().addressable.scenes;
        if scenes.is_empty() {
            return Err(AddressableError::NoDirectory);
        }
        let index = key.rem_euclid(scenes.len() as i64) as usize;
        Ok(Address::for_scene(scenes[index]))
    }

    pub async fn add(&self, key: i64, owner: Address, lock: bool) -> Result<(), AddressableError> {
        let directory = self.directory(key)?;
        self.scene
            .call(directory, &AddressableAddRequest { key, owner, lock })
            .await?;
        Ok(())
    }

    pub async fn get(&self, key: i64) -> Result<Address, AddressableError> {
        let directory = self.directory(key)?;
        match self.scene.call(directory, &AddressableGetRequest { key }).await {
            Ok(response) => Ok(response.owner),
            Err(e) if e.code() == ErrorCode::ADDRESSABLE_NOT_FOUND => Err(AddressableError::NotFound(key)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn remove(&self, key: i64) -> Result<(), AddressableError> {
        let directory = self.directory(key)?;
        self.scene.call(directory, &AddressableRemoveRequest { key }).await?;
        Ok(())
    }

    /// Freezes lookups of `key` until [`Self::unlock`], e.g. while its owner migrates.
    pub async fn lock(&self, key: i64) -> Result<(), AddressableError> {
        let directory = self.directory(key)?;
        self.scene.call(directory, &AddressableLockRequest { key }).await?;
        Ok(())
    }

    pub async fn unlock(&self, key: i64, owner: Address, source: &str) -> Result<(), AddressableError> {
        let directory = self.directory(key)?;
        let request = AddressableUnLockRequest {
            key,
            owner,
            source: source.to_string(),
        };
        self.scene.call(directory, &request).await?;
        Ok(())
    }

    /// Calls the entity registered under `key` and returns its typed response.
    pub async fn call<R: Request>(&self, key: i64, request: &R) -> Result<R::Response, AddressableError> {
        let frame = self.call_raw(key, R::OPCODE, request.encode()?).await?;
        Ok(decode_response::<R::Response>(&frame)?)
    }

    /// Calls the entity registered under `key`, retrying while it cannot be routed.
    ///
    /// Timeouts are returned immediately. The returned frame may still carry an application
    /// error code.
    #[tracing::instrument(skip(self, payload), fields(scene = %self.scene.id()))]
    pub async fn call_raw(&self, key: i64, opcode: OpCode, payload: Bytes) -> Result<Frame, AddressableError> {
        let _guard = self
            .lock
            .wait(key)
            .await
            .map_err(|source| AddressableError::Lock { key, source })?;
        let config = &self.scene.config().addressable;
        let mut attempt = 0;

        loop {
            let owner = self.get(key).await?;
            match self.scene.call_raw(owner, opcode, payload.clone()).await {
                Ok(frame) if frame.response_code() != ErrorCode::NOT_FOUND_ROUTE => return Ok(frame),
                Ok(_) => {}
                Err(e) if e.code() == ErrorCode::NOT_FOUND_ROUTE => {}
                Err(e) => return Err(e.into()),
            }

            attempt += 1;
            if attempt > config.retry_count {
                warn!(key, %owner, attempts = attempt, "Addressable unreachable");
                return Err(RpcError::Remote(ErrorCode::NOT_FOUND_ROUTE).into());
            }
            debug!(key, %owner, attempt, "Owner not routable, retrying");
            tokio::time::sleep(config.retry_backoff()).await;
        }
    }

    /// Resolves `key` once and sends `message` to its owner.
    pub async fn send<M: Message>(&self, key: i64, message: &M) -> Result<(), AddressableError> {
        self.send_raw(key, M::OPCODE, message.encode()?).await
    }

    pub async fn send_raw(&self, key: i64, opcode: OpCode, payload: Bytes) -> Result<(), AddressableError> {
        let _guard = self
            .lock
            .wait(key)
            .await
            .map_err(|source| AddressableError::Lock { key, source })?;
        let owner = self.get(key).await?;
        self.scene.send_frame(Frame::new(opcode, 0, owner, payload))?;
        Ok(())
    }
}
