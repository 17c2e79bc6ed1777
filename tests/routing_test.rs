mod common;

use common::*;
use scene_router::address::Address;
use scene_router::lock::LockError;
use scene_router::mock::MockSession;
use scene_router::protocol::messages::{PingRequest, PingResponse, RouteResponse};
use scene_router::protocol::{ErrorCode, Message};
use scene_router::rpc::RpcError;
use scene_router::runtime::Process;
use scene_router::scene::Session;
use std::sync::Arc;

#[tokio::test]
async fn ping_is_answered_with_the_callers_rpc_id() {
    let process = process("ping");
    let scene = process.create_scene(GATE).unwrap();
    let client = MockSession::outer();

    scene.receive(client.clone(), frame(&PingRequest {}, 5, Address::NONE));

    let pong: PingResponse = client.expect_response(5).await;
    assert!(pong.error_code.is_ok());
    assert!(pong.now_ms > 0);
}

#[tokio::test]
async fn request_to_unknown_address_fails_with_not_found_route() {
    let process = process("missing");
    let scene = process.create_scene(WORKER).unwrap();
    let caller = MockSession::inner();

    scene.receive(caller.clone(), frame(&Bump { value: 1 }, 7, scene.new_address()));

    let reply: BumpReply = caller.expect_response(7).await;
    assert_eq!(reply.error_code, ErrorCode::NOT_FOUND_ROUTE);
}

#[tokio::test]
async fn inner_opcode_from_client_closes_the_session() {
    let process = process("violation");
    let scene = process.create_scene(GATE).unwrap();
    let counter = scene.add_entity(Arc::new(Counter::default()));
    let client = MockSession::outer();

    scene.receive(client.clone(), frame(&Bump { value: 1 }, 3, counter));

    assert!(client.is_closed());
    assert!(client.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn frames_for_one_address_are_handled_in_arrival_order() {
    let process = process("ordering");
    let scene = process.create_scene(WORKER).unwrap();
    let counter = Arc::new(Counter::default());
    let address = scene.add_entity(counter.clone());
    let caller = MockSession::inner();

    // Earlier bumps sleep longer; only the route lock keeps them in order.
    for value in 0..5 {
        scene.receive(caller.clone(), frame(&Bump { value }, value + 1, address));
    }
    for value in 0..5 {
        let reply: BumpReply = caller.expect_response(value + 1).await;
        assert_eq!(reply.value, value);
    }
    assert_eq!(counter.seen(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn different_addresses_do_not_wait_for_each_other() {
    let process = process("parallel");
    let scene = process.create_scene(WORKER).unwrap();
    let slow = Arc::new(Counter::default());
    let fast = Arc::new(Counter::default());
    let slow_address = scene.add_entity(slow.clone());
    let fast_address = scene.add_entity(fast.clone());
    let caller = MockSession::inner();

    scene.receive(caller.clone(), frame(&Bump { value: 0 }, 1, slow_address));
    scene.receive(caller.clone(), frame(&Bump { value: 4 }, 2, fast_address));

    let first: BumpReply = caller.expect_response(2).await;
    assert_eq!(first.value, 4);
    let second: BumpReply = caller.expect_response(1).await;
    assert_eq!(second.value, 0);
}

#[tokio::test]
async fn forwarded_request_keeps_session_and_rpc_id_across_processes() {
    let first = process("first");
    let middle = process("middle");
    let last = process("last");
    let entry = first.create_scene(GATE).unwrap();
    let target = last.create_scene(OTHER).unwrap();
    let counter = target.add_entity(Arc::new(Counter::default()));

    // first -> middle -> last; middle hosts nothing itself.
    first.route_via(OTHER, &middle);
    middle.route_via(OTHER, &last);

    let caller = MockSession::inner();
    entry.receive(caller.clone(), frame(&Bump { value: 9 }, 42, counter));

    let reply: BumpReply = caller.expect_response(42).await;
    assert!(reply.error_code.is_ok());
    assert_eq!(reply.value, 9);
}

#[tokio::test]
async fn scene_call_round_trips_between_scenes() {
    let process = process("call");
    let caller = process.create_scene(GATE).unwrap();
    let callee = process.create_scene(WORKER).unwrap();
    let counter = callee.add_entity(Arc::new(Counter::default()));

    let reply = caller.call(counter, &Bump { value: 3 }).await.unwrap();
    assert_eq!(reply.value, 3);

    let err = caller.call(callee.new_address(), &Bump { value: 3 }).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NOT_FOUND_ROUTE);
}

#[tokio::test]
async fn call_to_unroutable_scene_fails_immediately() {
    let process = process("unroutable");
    let scene = process.create_scene(GATE).unwrap();
    let nowhere = Address::for_scene(scene_router::address::SceneId::new(9, 9));

    let err = scene.call(nowhere, &Bump { value: 1 }).await.unwrap_err();
    assert!(matches!(err, RpcError::Unroutable { .. }));
    assert_eq!(scene.correlator().pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn dispose_fails_pending_calls() {
    let process = process("dispose");
    let caller = process.create_scene(GATE).unwrap();
    let callee = process.create_scene(WORKER).unwrap();
    let counter = callee.add_entity(Arc::new(Counter::default()));

    // Value 0 sleeps 50ms, long enough to dispose the caller first.
    let call = {
        let caller = caller.clone();
        tokio::spawn(async move { caller.call(counter, &Bump { value: 0 }).await })
    };
    while caller.correlator().pending() == 0 {
        tokio::task::yield_now().await;
    }
    caller.dispose();

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, RpcError::Disposed(_)));
    assert_eq!(err.code(), ErrorCode::SCENE_DISPOSED);
    assert!(process.network().local_scene(GATE).is_none());
}

#[tokio::test(start_paused = true)]
async fn scene_flow_locks_use_configured_slots_and_close_on_dispose() {
    let mut config = config();
    config.lock.flow_slots = 2;
    let process = Process::new("flow", config).unwrap();
    let scene = process.create_scene(WORKER).unwrap();

    let flow = scene.new_flow_lock("storage");
    assert_eq!(flow.slots(), 2);
    let held = flow.wait(4).await.unwrap();
    assert_eq!(held.slot(), 0);

    let waiter = {
        let flow = flow.clone();
        tokio::spawn(async move { flow.wait(6).await.map(|permit| permit.slot()) })
    };
    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());

    scene.dispose();
    assert!(matches!(waiter.await.unwrap(), Err(LockError::Disposed(_))));
    assert!(matches!(flow.wait(1).await, Err(LockError::Disposed(_))));
}

#[tokio::test(start_paused = true)]
async fn responses_from_clients_are_refused() {
    let process = process("forged-response");
    let caller = process.create_scene(GATE).unwrap();
    let callee = process.create_scene(WORKER).unwrap();
    let counter = Arc::new(Counter::default());
    let address = callee.add_entity(counter.clone());

    let call = {
        let caller = caller.clone();
        tokio::spawn(async move { caller.call(address, &Bump { value: 0 }).await })
    };
    while caller.correlator().pending() == 0 {
        tokio::task::yield_now().await;
    }

    // The caller's first rpc id is 1; a client must not be able to complete it.
    let client = MockSession::outer();
    let forged = ClientBumpReply {
        value: 999,
        ..Default::default()
    };
    caller.receive(client.clone(), frame(&forged, 1, Address::NONE));

    assert!(client.is_closed());
    assert_eq!(caller.correlator().pending(), 1);
    let reply = call.await.unwrap().unwrap();
    assert_eq!(reply.value, 0);
    assert_eq!(counter.seen(), vec![0]);
}

#[tokio::test]
async fn reloaded_handler_set_replaces_the_old_one() {
    let process = process("reload");
    let scene = process.create_scene(WORKER).unwrap();
    let counter = scene.add_entity(Arc::new(Counter::default()));
    let caller = process.create_scene(GATE).unwrap();

    assert!(caller.call(counter, &Bump { value: 1 }).await.is_ok());

    process.unload(APP);
    assert!(!process.dispatcher().has_handler(Bump::OPCODE));
    let err = caller.call(counter, &Bump { value: 1 }).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::RPC_FAIL);

    process.load(app_handlers()).unwrap();
    let reply = caller.call(counter, &Bump { value: 2 }).await.unwrap();
    assert_eq!(reply.value, 2);
}

#[tokio::test]
async fn unregistered_request_gets_generic_failure_shape() {
    let process = process("generic");
    let scene = process.create_scene(WORKER).unwrap();
    process.unload(APP);
    let caller = MockSession::inner();

    scene.receive(caller.clone(), frame(&Bump { value: 1 }, 11, scene.new_address()));

    let reply: RouteResponse = caller.expect_response(11).await;
    assert_eq!(reply.error_code, ErrorCode::NOT_FOUND_ROUTE);
}

#[tokio::test]
async fn messages_to_client_session_entities_are_pushed_unchanged() {
    let process = process("push");
    let gate = process.create_scene(GATE).unwrap();
    let worker = process.create_scene(WORKER).unwrap();
    let client = MockSession::outer();
    let session = gate.accept(client.clone());

    let notice = Notice { text: "hello".into() };
    worker.send(session.address(), &notice).unwrap();

    let pushed = client.recv().await.unwrap();
    assert_eq!(pushed.opcode, Notice::OPCODE);
    assert_eq!(pushed.decode::<Notice>().unwrap(), notice);
}

#[tokio::test]
async fn process_drop_shuts_scenes_down() {
    let scene = {
        let process: Process = process("drop");
        process.create_scene(GATE).unwrap()
    };
    assert!(scene.is_disposed());
}
