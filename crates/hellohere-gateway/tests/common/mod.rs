#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use hellohere_db::MemoryStore;
use hellohere_gateway::auth::{AuthError, Identity, TokenVerifier};
use hellohere_gateway::clock::ManualClock;
use hellohere_gateway::safety::AllowAll;
use hellohere_gateway::transport::{PushError, Transport};
use hellohere_gateway::{ChatService, Dispatcher, GatewayConfig};

/// Records every push; connections marked gone refuse delivery.
#[derive(Default)]
pub struct FakeTransport {
    sent: Mutex<HashMap<String, Vec<Value>>>,
    gone: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeTransport {
    pub fn mark_gone(&self, connection_id: &str) {
        self.gone.lock().unwrap().insert(connection_id.to_string());
    }

    pub fn mark_failing(&self, connection_id: &str) {
        self.failing.lock().unwrap().insert(connection_id.to_string());
    }

    /// Everything pushed to `connection_id` so far, oldest first.
    pub fn sent(&self, connection_id: &str) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .get(connection_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Action names pushed to `connection_id`, oldest first.
    pub fn actions(&self, connection_id: &str) -> Vec<String> {
        self.sent(connection_id)
            .iter()
            .map(|v| v["action"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn last(&self, connection_id: &str) -> Value {
        self.sent(connection_id).pop().expect("nothing was sent")
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn push(&self, connection_id: &str, payload: &str) -> Result<(), PushError> {
        if self.gone.lock().unwrap().contains(connection_id) {
            return Err(PushError::Gone);
        }
        if self.failing.lock().unwrap().contains(connection_id) {
            return Err(PushError::Failed("throttled".into()));
        }
        let value: Value = serde_json::from_str(payload).expect("payload is JSON");
        self.sent
            .lock()
            .unwrap()
            .entry(connection_id.to_string())
            .or_default()
            .push(value);
        Ok(())
    }
}

/// Tokens are `user:<id>` or `user:<id>:<nickname>`.
pub struct PlainVerifier;

impl TokenVerifier for PlainVerifier {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let mut parts = token.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("user"), Some(id), nick) if !id.is_empty() => Ok(Identity {
                user_id: id.to_string(),
                nickname: nick.map(str::to_string),
            }),
            _ => Err(AuthError::Invalid("bad test token".into())),
        }
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub transport: Arc<FakeTransport>,
    pub clock: Arc<ManualClock>,
    pub chat: Arc<ChatService>,
    pub dispatcher: Dispatcher,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(GatewayConfig::default())
    }

    pub fn with_config(config: GatewayConfig) -> Self {
        let store = MemoryStore::new();
        let transport = Arc::new(FakeTransport::default());
        let clock = Arc::new(ManualClock::new(1_000));
        let chat = Arc::new(ChatService::with_parts(
            Arc::new(store.clone()),
            transport.clone(),
            config,
            clock.clone(),
            Arc::new(AllowAll),
        ));
        let dispatcher = Dispatcher::new(chat.clone(), Arc::new(PlainVerifier));
        Self {
            store,
            transport,
            clock,
            chat,
            dispatcher,
        }
    }

    /// Connect `connection_id` as `user` (nickname is the capitalized id).
    pub async fn connect(&self, connection_id: &str, user: &str) {
        let token = format!("user:{}:{}", user, capitalize(user));
        let resp = self
            .dispatcher
            .connect_with_token(connection_id, Some(&token))
            .await;
        assert_eq!(resp.status, 200, "connect {} failed: {}", user, resp.message);
    }

    /// Send a frame and return the route status.
    pub async fn send(&self, connection_id: &str, frame: Value) -> u16 {
        self.dispatcher
            .handle_message(connection_id, &frame.to_string())
            .await
            .status
    }

    /// Request + accept between two connected users; returns the room id.
    pub async fn accepted_room(&self, a: (&str, &str), b: (&str, &str)) -> String {
        let (a_conn, a_user) = a;
        let (b_conn, b_user) = b;
        self.send(
            a_conn,
            serde_json::json!({
                "action": "requestNewChat",
                "data": { "sender": a_user, "receiver": b_user }
            }),
        )
        .await;
        let room_id = self.transport.last(a_conn)["data"]["chatroomId"]
            .as_str()
            .unwrap()
            .to_string();
        let status = self
            .send(
                b_conn,
                serde_json::json!({
                    "action": "acceptNewChat",
                    "data": { "sender": a_user, "receiver": b_user, "chatRoomId": room_id }
                }),
            )
            .await;
        assert_eq!(status, 200);
        self.transport.clear();
        room_id
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
