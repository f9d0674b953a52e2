mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use common::{FakeTransport, Harness, PlainVerifier};
use hellohere_db::{ConnectionStore, MemoryStore, PresenceStore};
use hellohere_gateway::clock::ManualClock;
use hellohere_gateway::delivery::{Delivery, DeliveryReport};
use hellohere_gateway::safety::{SafetyCheck, SafetyVerdict};
use hellohere_gateway::scheduler;
use hellohere_gateway::{ChatService, Dispatcher, GatewayConfig};
use hellohere_types::events::ServerEvent;

#[tokio::test]
async fn fan_out_survives_a_gone_connection_and_prunes_it() {
    let h = Harness::new();
    h.connect("c1", "alice").await;
    h.connect("c2", "bob").await;
    h.connect("c3", "bob").await;
    let room_id = h.accepted_room(("c1", "alice"), ("c3", "bob")).await;

    h.transport.mark_gone("c2");
    let frame = json!({
        "action": "sendChatMsg",
        "data": { "sender": "alice", "chatroomId": room_id, "message": "still there?" }
    });
    assert_eq!(h.send("c1", frame).await, 200);

    assert_eq!(h.transport.last("c3")["action"], "newMsg");
    assert_eq!(h.transport.last("c1")["action"], "newMsg");
    assert!(h.store.get_connection("c2").await.unwrap().is_none());
    assert_eq!(h.store.connections_for_user("bob").await.unwrap().len(), 1);
    assert!(h.store.is_online("bob").await.unwrap());
}

#[tokio::test]
async fn broadcast_reports_each_outcome() {
    let h = Harness::new();
    h.connect("c1", "alice").await;
    h.connect("c2", "alice").await;
    h.connect("c3", "alice").await;
    h.transport.mark_gone("c2");
    h.transport.mark_failing("c3");

    let report = h
        .chat
        .broadcaster()
        .broadcast_to_users(&["alice", "nobody"], &ServerEvent::UpdateUserLocation {})
        .await;
    assert_eq!(
        report,
        DeliveryReport {
            delivered: 1,
            pruned: 1,
            failed: 1
        }
    );
    assert_eq!(report.attempted(), 3);

    // Failed pushes keep the row; only gone connections are pruned.
    assert!(h.store.get_connection("c3").await.unwrap().is_some());
    assert!(h.store.get_connection("c2").await.unwrap().is_none());
}

#[tokio::test]
async fn last_gone_connection_takes_the_user_offline() {
    let h = Harness::new();
    h.connect("c1", "alice").await;
    h.transport.mark_gone("c1");

    let outcome = h
        .chat
        .broadcaster()
        .send_to_connection("c1", &ServerEvent::UpdateUserLocation {})
        .await;
    assert_eq!(outcome, Delivery::Pruned);
    assert!(!h.store.is_online("alice").await.unwrap());
}

#[tokio::test]
async fn location_ping_reaches_everyone_and_refreshes_presence() {
    let h = Harness::new();
    h.connect("c1", "alice").await;
    h.connect("c2", "bob").await;
    h.connect("c3", "carol").await;
    h.transport.mark_gone("c3");

    let report = scheduler::ping_all(&h.chat).await;
    assert_eq!(report.delivered, 2);
    assert_eq!(report.pruned, 1);
    assert_eq!(h.transport.last("c1")["action"], "updateUserLocation");
    assert_eq!(h.transport.last("c2")["action"], "updateUserLocation");

    let reply = json!({
        "action": "updateUserLocationSuccess",
        "data": { "userId": "alice", "latitude": 37.5, "longitude": 127.0 }
    });
    assert_eq!(h.send("c1", reply).await, 200);
    assert!(h.store.is_online("alice").await.unwrap());

    let spoofed = json!({
        "action": "updateUserLocationSuccess",
        "data": { "userId": "bob" }
    });
    assert_eq!(h.send("c1", spoofed).await, 403);
}

#[tokio::test]
async fn connect_requires_a_valid_token_and_is_idempotent() {
    let h = Harness::new();

    assert_eq!(h.dispatcher.connect_with_token("c1", None).await.status, 401);
    assert_eq!(h.dispatcher.connect_with_token("c1", Some("")).await.status, 401);
    assert_eq!(h.dispatcher.connect_with_token("c1", Some("garbage")).await.status, 401);
    assert!(h.store.get_connection("c1").await.unwrap().is_none());

    h.connect("c1", "alice").await;
    h.connect("c1", "alice").await;
    assert_eq!(h.store.connections_for_user("alice").await.unwrap().len(), 1);

    assert_eq!(h.dispatcher.disconnect("c1").await.status, 200);
    assert_eq!(h.dispatcher.disconnect("c1").await.status, 200);
    assert!(!h.store.is_online("alice").await.unwrap());
}

#[tokio::test]
async fn unknown_connection_and_bad_frames_get_error_envelopes() {
    let h = Harness::new();
    let frame = json!({ "action": "getChatRooms", "data": {} });
    assert_eq!(h.send("ghost", frame).await, 401);
    let err = h.transport.last("ghost");
    assert_eq!(err["action"], "error");
    assert_eq!(err["data"]["status"], 401);

    h.connect("c1", "alice").await;
    assert_eq!(h.send("c1", json!({ "action": "teleport", "data": {} })).await, 400);
    assert_eq!(h.transport.last("c1")["data"]["action"], "unknown");

    let status = h
        .dispatcher
        .handle_message("c1", "{not json")
        .await
        .status;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn slow_handlers_time_out_as_internal_errors() {
    struct Stall;

    #[async_trait]
    impl SafetyCheck for Stall {
        async fn check(&self, text: &str) -> SafetyVerdict {
            tokio::time::sleep(Duration::from_secs(5)).await;
            SafetyVerdict::safe(text)
        }
    }

    let store = MemoryStore::new();
    let transport = Arc::new(FakeTransport::default());
    let chat = Arc::new(ChatService::with_parts(
        Arc::new(store.clone()),
        transport.clone(),
        GatewayConfig {
            handler_timeout: Duration::from_millis(50),
            ..GatewayConfig::default()
        },
        Arc::new(ManualClock::new(1)),
        Arc::new(Stall),
    ));
    let dispatcher = Dispatcher::new(chat.clone(), Arc::new(PlainVerifier));
    dispatcher.connect_with_token("c1", Some("user:alice")).await;

    let create = json!({ "action": "createRoom", "data": { "sender": "alice", "receiver": "bob" } });
    dispatcher.handle_message("c1", &create.to_string()).await;
    let room_id = transport.last("c1")["data"]["chatroomId"]
        .as_str()
        .unwrap()
        .to_string();

    let send = json!({
        "action": "sendChatMsg",
        "data": { "sender": "alice", "chatroomId": room_id, "message": "hello" }
    });
    let resp = dispatcher.handle_message("c1", &send.to_string()).await;
    assert_eq!(resp.status, 500);

    let err = transport.last("c1");
    assert_eq!(err["action"], "error");
    assert_eq!(err["data"]["action"], "sendChatMsg");
    assert_eq!(err["data"]["reason"], "internal error");
}
