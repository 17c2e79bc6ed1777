mod common;

use common::*;
use scene_router::address::Address;
use scene_router::addressable::AddressableClient;
use scene_router::gate::GateComponent;
use scene_router::mock::MockSession;
use scene_router::protocol::ErrorCode;
use scene_router::scene::Session;
use std::sync::Arc;

#[tokio::test]
async fn addressable_frames_follow_the_bound_key() {
    let process = process("gate-addressable");
    process.create_scene(DIRECTORY).unwrap();
    let gate = process.create_scene(GATE).unwrap();
    let worker = process.create_scene(WORKER).unwrap();
    let counter = Arc::new(Counter::default());
    let owner = worker.add_entity(counter.clone());
    AddressableClient::new(&worker).add(77, owner, false).await.unwrap();

    let client = MockSession::outer();
    let session = gate.accept(client.clone());
    session.bind_addressable(77);

    gate.receive(client.clone(), frame(&ClientBump { value: 2 }, 31, Address::NONE));

    let reply: ClientBumpReply = client.expect_response(31).await;
    assert!(reply.error_code.is_ok());
    assert_eq!(reply.value, 2);
    assert_eq!(counter.seen(), vec![2]);
}

#[tokio::test]
async fn addressable_frame_without_binding_fails() {
    let process = process("gate-unbound");
    let gate = process.create_scene(GATE).unwrap();
    let client = MockSession::outer();
    gate.accept(client.clone());

    gate.receive(client.clone(), frame(&ClientBump { value: 1 }, 32, Address::NONE));

    let reply: ClientBumpReply = client.expect_response(32).await;
    assert_eq!(reply.error_code, ErrorCode::NOT_FOUND_ROUTE);
}

#[tokio::test]
async fn custom_route_frames_reach_the_bound_address() {
    let process = process("gate-route");
    let gate = process.create_scene(GATE).unwrap();
    let worker = process.create_scene(WORKER).unwrap();
    let counter = Arc::new(Counter::default());
    let target = worker.add_entity(counter.clone());

    let client = MockSession::outer();
    let session = gate.accept(client.clone());
    session.bind_route(COUNTER_ROUTE, target);
    assert_eq!(session.route(COUNTER_ROUTE), Some(target));

    gate.receive(client.clone(), frame(&RoutedBump { value: 4 }, 33, Address::NONE));
    let reply: RoutedBumpReply = client.expect_response(33).await;
    assert_eq!(reply.value, 4);

    assert_eq!(session.unbind_route(COUNTER_ROUTE), Some(target));
    gate.receive(client.clone(), frame(&RoutedBump { value: 4 }, 34, Address::NONE));
    let reply: RoutedBumpReply = client.expect_response(34).await;
    assert_eq!(reply.error_code, ErrorCode::NOT_FOUND_ROUTE);
}

#[tokio::test]
async fn roaming_frame_without_roaming_component_fails() {
    let process = process("gate-no-roaming");
    let gate = process.create_scene(GATE).unwrap();
    let client = MockSession::outer();
    gate.accept(client.clone());

    gate.receive(client.clone(), frame(&GetLevel {}, 35, Address::NONE));

    let reply: LevelReply = client.expect_response(35).await;
    assert_eq!(reply.error_code, ErrorCode::NOT_FOUND_ROAMING);
}

#[tokio::test]
async fn accepted_sessions_are_tracked_until_closed() {
    let process = process("gate-track");
    let gate = process.create_scene(GATE).unwrap();
    let client = MockSession::outer();

    let session = gate.accept(client.clone());
    let component = GateComponent::of(&gate);
    assert_eq!(component.len(), 1);
    assert!(component.by_address(session.address()).is_some());
    assert!(gate.entities().get(session.address()).is_some());

    gate.close_session(client.id()).await;
    assert!(component.is_empty());
    assert!(gate.gate_session(client.id()).is_none());
}
