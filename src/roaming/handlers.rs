//! Wire handlers of the roaming protocol, bound to scene roots.
//!
//! Terminus-side handlers run on the scene hosting (or receiving) a terminus; gate-side
//! handlers run on the forward scene and act on the link table of a gate session.

use super::{RoamingError, SessionRoaming, Terminus, TerminusComponent};
use crate::address::Address;
use crate::dispatch::{AddressRequestHandler, HandlerError, HandlerSet, MessageContext};
use crate::gate::GateComponent;
use crate::protocol::messages::*;
use crate::scene::Scene;
use async_trait::async_trait;
use std::sync::Arc;

pub const ASSEMBLY: &str = "roaming";

struct LinkRoaming;
struct UnLinkRoaming;
struct TransferTerminus;
struct SetForwardSession;
struct LockTerminusId;
struct UnLockTerminusId;
struct GetTerminusId;

#[async_trait]
impl AddressRequestHandler<Scene, LinkRoamingRequest> for LinkRoaming {
    async fn handle(&self, _ctx: &MessageContext, scene: Arc<Scene>, request: LinkRoamingRequest) -> Result<LinkRoamingResponse, HandlerError> {
        let terminus = TerminusComponent::of(&scene).link(&scene, &request)?;
        Ok(LinkRoamingResponse {
            terminus_id: terminus.terminus_id(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl AddressRequestHandler<Scene, UnLinkRoamingRequest> for UnLinkRoaming {
    async fn handle(&self, _ctx: &MessageContext, scene: Arc<Scene>, request: UnLinkRoamingRequest) -> Result<UnLinkRoamingResponse, HandlerError> {
        TerminusComponent::of(&scene)
            .remove(&scene, request.terminus_id, request.dispose_entity)
            .ok_or(RoamingError::NotFound(0))?;
        Ok(UnLinkRoamingResponse::default())
    }
}

#[async_trait]
impl AddressRequestHandler<Scene, TransferTerminusRequest> for TransferTerminus {
    async fn handle(&self, _ctx: &MessageContext, scene: Arc<Scene>, request: TransferTerminusRequest) -> Result<TransferTerminusResponse, HandlerError> {
        Terminus::transfer_complete(&scene, request.snapshot).await?;
        Ok(TransferTerminusResponse::default())
    }
}

#[async_trait]
impl AddressRequestHandler<Scene, SetForwardSessionRequest> for SetForwardSession {
    async fn handle(&self, _ctx: &MessageContext, scene: Arc<Scene>, request: SetForwardSessionRequest) -> Result<SetForwardSessionResponse, HandlerError> {
        let terminus = TerminusComponent::of(&scene)
            .get(request.terminus_id)
            .ok_or(RoamingError::NotFound(0))?;
        terminus.set_forward_session(request.forward_session);
        Ok(SetForwardSessionResponse::default())
    }
}

fn session_roaming(scene: &Scene, session: Address, roaming_type: u32) -> Result<Arc<SessionRoaming>, RoamingError> {
    GateComponent::of(scene)
        .by_address(session)
        .and_then(|gate| gate.roaming())
        .ok_or(RoamingError::NotFound(roaming_type))
}

#[async_trait]
impl AddressRequestHandler<Scene, LockTerminusIdRequest> for LockTerminusId {
    async fn handle(&self, _ctx: &MessageContext, scene: Arc<Scene>, request: LockTerminusIdRequest) -> Result<LockTerminusIdResponse, HandlerError> {
        let roaming = session_roaming(&scene, request.session, request.roaming_type)?;
        if roaming.linked(request.roaming_type).is_none() {
            return Err(RoamingError::NotFound(request.roaming_type).into());
        }
        roaming.lock_terminus(request.roaming_type).await?;
        Ok(LockTerminusIdResponse::default())
    }
}

#[async_trait]
impl AddressRequestHandler<Scene, UnLockTerminusIdRequest> for UnLockTerminusId {
    async fn handle(&self, _ctx: &MessageContext, scene: Arc<Scene>, request: UnLockTerminusIdRequest) -> Result<UnLockTerminusIdResponse, HandlerError> {
        let roaming = session_roaming(&scene, request.session, request.roaming_type)?;
        roaming.unlock_terminus(request.roaming_type, request.terminus_id, request.target_scene)?;
        Ok(UnLockTerminusIdResponse::default())
    }
}

#[async_trait]
impl AddressRequestHandler<Scene, GetTerminusIdRequest> for GetTerminusId {
    async fn handle(&self, _ctx: &MessageContext, scene: Arc<Scene>, request: GetTerminusIdRequest) -> Result<GetTerminusIdResponse, HandlerError> {
        let roaming = session_roaming(&scene, request.session, request.roaming_type)?;
        let terminus_id = roaming.terminus_id(request.roaming_type).await?;
        Ok(GetTerminusIdResponse {
            terminus_id,
            ..Default::default()
        })
    }
}

/// The roaming protocol's handler set.
pub fn handlers() -> HandlerSet {
    HandlerSet::new(ASSEMBLY)
        .address_request::<Scene, LinkRoamingRequest, _>(LinkRoaming)
        .address_request::<Scene, UnLinkRoamingRequest, _>(UnLinkRoaming)
        .address_request::<Scene, TransferTerminusRequest, _>(TransferTerminus)
        .address_request::<Scene, SetForwardSessionRequest, _>(SetForwardSession)
        .address_request::<Scene, LockTerminusIdRequest, _>(LockTerminusId)
        .address_request::<Scene, UnLockTerminusIdRequest, _>(UnLockTerminusId)
        .address_request::<Scene, GetTerminusIdRequest, _>(GetTerminusId)
}
