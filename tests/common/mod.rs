//! Entities, messages and handlers shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use scene_router::address::SceneId;
use scene_router::config::RuntimeConfig;
use scene_router::dispatch::{AddressRequestHandler, HandlerError, HandlerSet, MessageContext};
use scene_router::opcode::{OpCode, OpCodeType, PackFormat};
use scene_router::protocol::{Codec, CodecError, ErrorCode, JsonCodec};
use scene_router::roaming::RoamingEntity;
use scene_router::runtime::{try_setup_tracing, Process};
use scene_router::{message, request, response};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const APP: &str = "app";

pub const GATE: SceneId = SceneId::new(1, 1);
pub const WORKER: SceneId = SceneId::new(1, 2);
pub const OTHER: SceneId = SceneId::new(1, 3);
pub const DIRECTORY: SceneId = SceneId::new(1, 4);

pub const PLAYER_ROAMING: u32 = 2;
pub const BAG_ROAMING: u32 = 3;
pub const COUNTER_ROUTE: u32 = 5;

const fn op(protocol: OpCodeType, index: u32) -> OpCode {
    OpCode::new(PackFormat::Json, protocol, index)
}

pub const BUMP: OpCode = op(OpCodeType::InnerAddressRequest, 100);
pub const BUMP_REPLY: OpCode = op(OpCodeType::InnerAddressResponse, 100);
pub const CLIENT_BUMP: OpCode = op(OpCodeType::OuterAddressableRequest, 100);
pub const CLIENT_BUMP_REPLY: OpCode = op(OpCodeType::OuterAddressableResponse, 100);
pub const ROUTED_BUMP: OpCode = op(OpCodeType::OuterCustomRouteRequest, 100);
pub const ROUTED_BUMP_REPLY: OpCode = op(OpCodeType::OuterCustomRouteResponse, 100);
pub const GET_LEVEL: OpCode = op(OpCodeType::OuterRoamingRequest, 100);
pub const LEVEL_REPLY: OpCode = op(OpCodeType::OuterRoamingResponse, 100);
pub const GET_ITEMS: OpCode = op(OpCodeType::InnerRoamingRequest, 100);
pub const ITEMS_REPLY: OpCode = op(OpCodeType::InnerRoamingResponse, 100);
pub const NOTICE: OpCode = op(OpCodeType::OuterMessage, 100);

/// Records the values it was bumped with, in handling order.
#[derive(Default)]
pub struct Counter {
    pub seen: Mutex<Vec<u32>>,
}

impl Counter {
    pub fn seen(&self) -> Vec<u32> {
        self.seen.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bump {
    pub value: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BumpReply {
    pub error_code: ErrorCode,
    pub value: u32,
}

request!(Bump => BUMP, response = BumpReply);
response!(BumpReply => BUMP_REPLY);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientBump {
    pub value: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientBumpReply {
    pub error_code: ErrorCode,
    pub value: u32,
}

request!(ClientBump => CLIENT_BUMP, response = ClientBumpReply);
response!(ClientBumpReply => CLIENT_BUMP_REPLY);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutedBump {
    pub value: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutedBumpReply {
    pub error_code: ErrorCode,
    pub value: u32,
}

request!(RoutedBump => ROUTED_BUMP, response = RoutedBumpReply, route = COUNTER_ROUTE);
response!(RoutedBumpReply => ROUTED_BUMP_REPLY);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetLevel {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevelReply {
    pub error_code: ErrorCode,
    pub name: String,
    pub level: u32,
}

request!(GetLevel => GET_LEVEL, response = LevelReply, route = PLAYER_ROAMING);
response!(LevelReply => LEVEL_REPLY);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetItems {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemsReply {
    pub error_code: ErrorCode,
    pub items: Vec<String>,
}

request!(GetItems => GET_ITEMS, response = ItemsReply, route = BAG_ROAMING);
response!(ItemsReply => ITEMS_REPLY);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub text: String,
}

message!(Notice => NOTICE);

/// Bumps the counter after a delay that shrinks with the value, so later bumps would
/// overtake earlier ones without per-address ordering.
pub struct BumpHandler;

impl BumpHandler {
    async fn bump(counter: &Counter, value: u32) -> u32 {
        let delay = 10 * u64::from(5u32.saturating_sub(value));
        tokio::time::sleep(Duration::from_millis(delay)).await;
        counter.seen.lock().unwrap().push(value);
        value
    }
}

#[async_trait]
impl AddressRequestHandler<Counter, Bump> for BumpHandler {
    async fn handle(&self, _ctx: &MessageContext, counter: Arc<Counter>, request: Bump) -> Result<BumpReply, HandlerError> {
        let value = Self::bump(&counter, request.value).await;
        Ok(BumpReply {
            value,
            ..Default::default()
        })
    }
}

#[async_trait]
impl AddressRequestHandler<Counter, ClientBump> for BumpHandler {
    async fn handle(&self, _ctx: &MessageContext, counter: Arc<Counter>, request: ClientBump) -> Result<ClientBumpReply, HandlerError> {
        let value = Self::bump(&counter, request.value).await;
        Ok(ClientBumpReply {
            value,
            ..Default::default()
        })
    }
}

#[async_trait]
impl AddressRequestHandler<Counter, RoutedBump> for BumpHandler {
    async fn handle(&self, _ctx: &MessageContext, counter: Arc<Counter>, request: RoutedBump) -> Result<RoutedBumpReply, HandlerError> {
        let value = Self::bump(&counter, request.value).await;
        Ok(RoutedBumpReply {
            value,
            ..Default::default()
        })
    }
}

/// A roaming entity that travels with its terminus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub level: u32,
}

impl RoamingEntity for Player {
    const ENTITY_TYPE: &'static str = "Player";

    fn snapshot(&self) -> Result<Vec<u8>, CodecError> {
        Ok(JsonCodec.encode(self)?.to_vec())
    }

    fn restore(bytes: &[u8]) -> Result<Self, CodecError> {
        JsonCodec.decode(bytes)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bag {
    pub items: Vec<String>,
}

impl RoamingEntity for Bag {
    const ENTITY_TYPE: &'static str = "Bag";

    fn snapshot(&self) -> Result<Vec<u8>, CodecError> {
        Ok(JsonCodec.encode(self)?.to_vec())
    }

    fn restore(bytes: &[u8]) -> Result<Self, CodecError> {
        JsonCodec.decode(bytes)
    }
}

pub struct PlayerHandler;

#[async_trait]
impl AddressRequestHandler<Player, GetLevel> for PlayerHandler {
    async fn handle(&self, _ctx: &MessageContext, player: Arc<Player>, _request: GetLevel) -> Result<LevelReply, HandlerError> {
        Ok(LevelReply {
            name: player.name.clone(),
            level: player.level,
            ..Default::default()
        })
    }
}

#[async_trait]
impl AddressRequestHandler<Bag, GetItems> for PlayerHandler {
    async fn handle(&self, _ctx: &MessageContext, bag: Arc<Bag>, _request: GetItems) -> Result<ItemsReply, HandlerError> {
        Ok(ItemsReply {
            items: bag.items.clone(),
            ..Default::default()
        })
    }
}

pub fn app_handlers() -> HandlerSet {
    HandlerSet::new(APP)
        .address_request::<Counter, Bump, _>(BumpHandler)
        .address_request::<Counter, ClientBump, _>(BumpHandler)
        .address_request::<Counter, RoutedBump, _>(BumpHandler)
        .address_request::<Player, GetLevel, _>(PlayerHandler)
        .address_request::<Bag, GetItems, _>(PlayerHandler)
        .types(|types| {
            types.message::<Notice>();
        })
        .roaming_entity::<Player>()
        .roaming_entity::<Bag>()
}

pub fn config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.addressable.scenes = vec![DIRECTORY];
    config.addressable.retry_backoff_ms = 10;
    config.roaming.retry_backoff_ms = 10;
    config
}

/// A process with the test handlers loaded.
pub fn process(name: &str) -> Process {
    try_setup_tracing();
    let process = Process::new(name, config()).unwrap();
    process.load(app_handlers()).unwrap();
    process
}

/// Encodes `message` for `scene.receive`.
pub fn frame<M: scene_router::protocol::Message>(message: &M, rpc_id: u32, address: scene_router::address::Address) -> scene_router::protocol::Frame {
    scene_router::protocol::Frame::encode(message, rpc_id, address).unwrap()
}
