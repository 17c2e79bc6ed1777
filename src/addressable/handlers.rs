//! Wire handlers of the directory, bound to the directory scene's root address.

use super::AddressableManager;
use crate::dispatch::{AddressRequestHandler, HandlerError, HandlerSet, MessageContext};
use crate::protocol::messages::*;
use crate::scene::Scene;
use async_trait::async_trait;
use std::sync::Arc;

pub const ASSEMBLY: &str = "addressable";

struct Add;
struct Get;
struct Remove;
struct Lock;
struct UnLock;

#[async_trait]
impl AddressRequestHandler<Scene, AddressableAddRequest> for Add {
    async fn handle(&self, _ctx: &MessageContext, scene: Arc<Scene>, request: AddressableAddRequest) -> Result<AddressableAddResponse, HandlerError> {
        AddressableManager::of(&scene).add(request.key, request.owner, request.lock).await?;
        Ok(AddressableAddResponse::default())
    }
}

#[async_trait]
impl AddressRequestHandler<Scene, AddressableGetRequest> for Get {
    async fn handle(&self, _ctx: &MessageContext, scene: Arc<Scene>, request: AddressableGetRequest) -> Result<AddressableGetResponse, HandlerError> {
        let owner = AddressableManager::of(&scene).get(request.key).await?;
        Ok(AddressableGetResponse {
            owner,
            ..Default::default()
        })
    }
}

#[async_trait]
impl AddressRequestHandler<Scene, AddressableRemoveRequest> for Remove {
    async fn handle(&self, _ctx: &MessageContext, scene: Arc<Scene>, request: AddressableRemoveRequest) -> Result<AddressableRemoveResponse, HandlerError> {
        AddressableManager::of(&scene).remove(request.key).await?;
        Ok(AddressableRemoveResponse::default())
    }
}

#[async_trait]
impl AddressRequestHandler<Scene, AddressableLockRequest> for Lock {
    async fn handle(&self, _ctx: &MessageContext, scene: Arc<Scene>, request: AddressableLockRequest) -> Result<AddressableLockResponse, HandlerError> {
        AddressableManager::of(&scene).lock(request.key).await?;
        Ok(AddressableLockResponse::default())
    }
}

#[async_trait]
impl AddressRequestHandler<Scene, AddressableUnLockRequest> for UnLock {
    async fn handle(&self, _ctx: &MessageContext, scene: Arc<Scene>, request: AddressableUnLockRequest) -> Result<AddressableUnLockResponse, HandlerError> {
        AddressableManager::of(&scene).unlock(request.key, request.owner, &request.source)?;
        Ok(AddressableUnLockResponse::default())
    }
}

/// The directory's handler set.
pub fn handlers() -> HandlerSet {
    HandlerSet::new(ASSEMBLY)
        .address_request::<Scene, AddressableAddRequest, _>(Add)
        .address_request::<Scene, AddressableGetRequest, _>(Get)
        .address_request::<Scene, AddressableRemoveRequest, _>(Remove)
        .address_request::<Scene, AddressableLockRequest, _>(Lock)
        .address_request::<Scene, AddressableUnLockRequest, _>(UnLock)
}
