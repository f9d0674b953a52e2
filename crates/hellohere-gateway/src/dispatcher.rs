use std::sync::Arc;

use tracing::{debug, info, warn};

use hellohere_types::events::{ClientAction, ServerEvent};

use crate::auth::{AuthError, Identity, TokenVerifier};
use crate::chat::{Actor, ChatService, Outgoing};
use crate::error::ChatError;
use crate::registry::Registration;

/// Route result in the shape of the hosting gateway's `{statusCode, body}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteResponse {
    pub status: u16,
    pub message: String,
}

impl RouteResponse {
    fn ok(message: &str) -> Self {
        Self {
            status: 200,
            message: message.to_string(),
        }
    }
}

impl From<&ChatError> for RouteResponse {
    fn from(e: &ChatError) -> Self {
        Self {
            status: e.status(),
            message: e.reason(),
        }
    }
}

/// Entry point for the real-time routes: connect, disconnect, and one
/// `{action, data}` frame at a time.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    chat: Arc<ChatService>,
    verifier: Arc<dyn TokenVerifier>,
}

impl Dispatcher {
    pub fn new(chat: Arc<ChatService>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner { chat, verifier }),
        }
    }

    pub fn chat(&self) -> &Arc<ChatService> {
        &self.inner.chat
    }

    /// Check the token presented at connect time.
    pub fn authenticate(&self, token: Option<&str>) -> Result<Identity, ChatError> {
        let token = token.filter(|t| !t.is_empty()).ok_or_else(|| {
            ChatError::Unauthorized(AuthError::Missing.to_string())
        })?;
        self.inner.verifier.verify(token).map_err(|e| {
            debug!("Connect rejected: {}", e);
            ChatError::Unauthorized("invalid token".into())
        })
    }

    /// Register an already-authenticated connection.
    pub async fn connect(&self, connection_id: &str, identity: &Identity) -> Result<Registration, ChatError> {
        self.inner
            .chat
            .registry()
            .register(connection_id, &identity.user_id, identity.nickname.as_deref())
            .await
    }

    /// The `$connect` route: verify the token and register the connection.
    pub async fn connect_with_token(&self, connection_id: &str, token: Option<&str>) -> RouteResponse {
        let result = match self.authenticate(token) {
            Ok(identity) => self.connect(connection_id, &identity).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(_) => RouteResponse::ok("Connected"),
            Err(e) => {
                info!("Connection {} refused: {}", connection_id, e);
                RouteResponse::from(&e)
            }
        }
    }

    /// The `$disconnect` route. Unknown connections are not an error.
    pub async fn disconnect(&self, connection_id: &str) -> RouteResponse {
        match self.inner.chat.registry().unregister(connection_id).await {
            Ok(_) => RouteResponse::ok("Disconnected"),
            Err(e) => {
                warn!("Disconnect of {} failed: {}", connection_id, e);
                RouteResponse::from(&e)
            }
        }
    }

    /// Handle one inbound frame. Failures are reported to the calling
    /// connection in the regular `{action, data}` envelope.
    pub async fn handle_message(&self, connection_id: &str, raw: &str) -> RouteResponse {
        let action = match serde_json::from_str::<ClientAction>(raw) {
            Ok(action) => action,
            Err(e) => {
                warn!(
                    "Connection {} sent a bad frame: {} -- raw: {}",
                    connection_id,
                    e,
                    truncate(raw, 200)
                );
                let err = ChatError::BadRequest("unrecognized action or payload".into());
                self.reply(connection_id, &error_event("unknown", &err)).await;
                return RouteResponse::from(&err);
            }
        };

        let name = action.name();
        let timeout = self.inner.chat.config().handler_timeout;
        let result = match tokio::time::timeout(timeout, self.route(connection_id, &action)).await {
            Ok(result) => result,
            Err(_) => Err(ChatError::Internal(format!("{} timed out after {:?}", name, timeout))),
        };

        match result {
            Ok(message) => RouteResponse::ok(message),
            Err(e) => {
                if e.status() >= 500 {
                    warn!("{} from {} failed: {}", name, connection_id, e);
                } else {
                    debug!("{} from {} rejected: {}", name, connection_id, e);
                }
                let event = match &action {
                    ClientAction::LeaveChatRoom { chatroom_id, .. } => ServerEvent::LeaveRoomResponse {
                        chatroom_id: chatroom_id.clone(),
                        success: false,
                        message: None,
                        error: Some(e.reason()),
                    },
                    _ => error_event(name, &e),
                };
                self.reply(connection_id, &event).await;
                RouteResponse::from(&e)
            }
        }
    }

    async fn reply(&self, connection_id: &str, event: &ServerEvent) {
        self.inner
            .chat
            .broadcaster()
            .send_to_connection(connection_id, event)
            .await;
    }

    async fn route(&self, connection_id: &str, action: &ClientAction) -> Result<&'static str, ChatError> {
        let chat = &self.inner.chat;
        let actor = Actor::from(chat.registry().authenticate(connection_id).await?);

        match action {
            ClientAction::RequestNewChat { sender, receiver } => {
                let (room, _) = chat.request_chat(&actor, sender, receiver).await?;
                self.reply(connection_id, &ServerEvent::RoomCreated(room)).await;
                Ok("Chat requested")
            }
            ClientAction::AcceptNewChat {
                sender,
                receiver,
                chat_room_id,
            } => {
                let room = chat.accept_chat(&actor, sender, receiver, chat_room_id).await?;
                self.reply(connection_id, &ServerEvent::RoomCreated(room)).await;
                Ok("Chat accepted")
            }
            ClientAction::RejectNewChat {
                sender,
                receiver,
                chat_room_id,
            } => {
                let (_, event) = chat.reject_chat(&actor, sender, receiver, chat_room_id).await?;
                self.reply(connection_id, &event).await;
                Ok("Chat rejected")
            }
            ClientAction::CreateRoom { sender, receiver } => {
                let (room, _) = chat.create_room(&actor, sender, receiver, None).await?;
                self.reply(connection_id, &ServerEvent::RoomCreated(room)).await;
                Ok("Room created")
            }
            ClientAction::SendChatMsg {
                sender,
                chatroom_id,
                message,
                kind,
                attachments,
            } => {
                let outgoing = Outgoing {
                    body: message.clone(),
                    kind: *kind,
                    attachments: attachments.clone(),
                };
                chat.send_message(&actor, sender, chatroom_id, outgoing).await?;
                Ok("Message sent")
            }
            ClientAction::GetChatHistory {
                chatroom_id,
                limit,
                before,
            } => {
                let messages = chat.history(&actor, chatroom_id, *limit, *before).await?;
                let event = ServerEvent::ChatHistory {
                    chatroom_id: chatroom_id.clone(),
                    messages,
                };
                self.reply(connection_id, &event).await;
                Ok("Chat history sent")
            }
            ClientAction::GetChatRooms {} => {
                let rooms = chat.list_rooms(&actor).await?;
                self.reply(connection_id, &ServerEvent::ChatRoomsList { rooms }).await;
                Ok("Chat rooms sent")
            }
            ClientAction::LeaveChatRoom { chatroom_id, user_id } => {
                chat.leave_room(&actor, chatroom_id, user_id).await?;
                let event = ServerEvent::LeaveRoomResponse {
                    chatroom_id: chatroom_id.clone(),
                    success: true,
                    message: Some("Successfully left the chat room".into()),
                    error: None,
                };
                self.reply(connection_id, &event).await;
                Ok("Left chat room")
            }
            ClientAction::OpenChatRoom { chatroom_id, user_id } => {
                chat.open_room(&actor, chatroom_id, user_id).await?;
                Ok("Chat room opened")
            }
            ClientAction::UpdateUserLocationSuccess {
                user_id,
                latitude,
                longitude,
                ..
            } => {
                chat.location_updated(&actor, user_id, *latitude, *longitude)
                    .await?;
                Ok("Location updated")
            }
        }
    }
}

fn error_event(action: &str, e: &ChatError) -> ServerEvent {
    ServerEvent::Error {
        action: action.to_string(),
        status: e.status(),
        reason: e.reason(),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
