//! The chat flows: request, accept, reject, send, history, open, leave.
//!
//! Every flow validates the caller and the room before it writes anything.
//! Notifications to the other participant happen inside the flow; the reply
//! to the caller is left to whoever invoked it (the WebSocket dispatcher or a
//! REST handler).

use std::sync::Arc;

use futures_util::future::try_join_all;
use serde_json::json;
use tracing::{debug, info, warn};

use hellohere_db::Store;
use hellohere_types::events::ServerEvent;
use hellohere_types::models::{ChatMessage, ChatRoom, ConnectionInfo, MessageKind, RoomStatus};

use crate::clock::{Clock, SystemClock};
use crate::config::{GatewayConfig, LeavePolicy};
use crate::delivery::Broadcaster;
use crate::error::ChatError;
use crate::machine::{self, RoomAction};
use crate::messages::{MessageLog, NewMessage, ReadState};
use crate::presence::Presence;
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomService;
use crate::safety::{AllowAll, RiskLevel, SafetyCheck, SafetyVerdict};
use crate::transport::Transport;

/// The authenticated caller of a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub nickname: Option<String>,
    /// Set when the call came in over a live connection.
    pub connection_id: Option<String>,
}

impl Actor {
    pub fn user(user_id: impl Into<String>, nickname: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            nickname,
            connection_id: None,
        }
    }

    fn require_self(&self, claimed: &str, what: &str) -> Result<(), ChatError> {
        if claimed != self.user_id {
            return Err(ChatError::Forbidden(format!(
                "{} must be the authenticated user",
                what
            )));
        }
        Ok(())
    }
}

impl From<ConnectionInfo> for Actor {
    fn from(conn: ConnectionInfo) -> Self {
        Self {
            user_id: conn.user_id,
            nickname: conn.nickname,
            connection_id: Some(conn.connection_id),
        }
    }
}

/// A message as the client submitted it.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub body: String,
    pub kind: MessageKind,
    pub attachments: Vec<String>,
}

/// A stored message with the text as submitted and the safety verdict.
#[derive(Debug, Clone)]
pub struct Screened {
    pub message: ChatMessage,
    pub original: String,
    pub verdict: SafetyVerdict,
}

pub struct ChatService {
    registry: Arc<ConnectionRegistry>,
    rooms: RoomService,
    messages: MessageLog,
    presence: Presence,
    broadcaster: Broadcaster,
    safety: Arc<dyn SafetyCheck>,
    clock: Arc<dyn Clock>,
    config: GatewayConfig,
}

impl ChatService {
    pub fn new(store: Arc<dyn Store>, transport: Arc<dyn Transport>, config: GatewayConfig) -> Self {
        Self::with_parts(
            store,
            transport,
            config,
            Arc::new(SystemClock::new()),
            Arc::new(AllowAll),
        )
    }

    pub fn with_parts(
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        config: GatewayConfig,
        clock: Arc<dyn Clock>,
        safety: Arc<dyn SafetyCheck>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(store.clone(), clock.clone()));
        Self {
            rooms: RoomService::new(store.clone(), clock.clone()),
            messages: MessageLog::new(store.clone(), clock.clone()),
            presence: Presence::new(store),
            broadcaster: Broadcaster::new(registry.clone(), transport),
            registry,
            safety,
            clock,
            config,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomService {
        &self.rooms
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    async fn display_name(&self, actor: &Actor) -> String {
        match &actor.nickname {
            Some(nick) => nick.clone(),
            None => self.presence.display_name(&actor.user_id).await,
        }
    }

    /// Load a room the actor is allowed to act on.
    async fn room_for(&self, actor: &Actor, room_id: &str, action: RoomAction) -> Result<ChatRoom, ChatError> {
        let room = self.rooms.require(room_id).await?;
        machine::authorize(&room, &actor.user_id, action)?;
        Ok(room)
    }

    async fn participant_room(&self, actor: &Actor, room_id: &str) -> Result<ChatRoom, ChatError> {
        let room = self.rooms.require(room_id).await?;
        if !room.is_participant(&actor.user_id) {
            return Err(ChatError::Forbidden("not a participant of this room".into()));
        }
        Ok(room)
    }

    async fn notify_other(&self, room: &ChatRoom, actor: &Actor, event: ServerEvent) {
        if let Some(other) = room.other_participant(&actor.user_id) {
            self.broadcaster.broadcast_to_users(&[other], &event).await;
        }
    }

    /// Ask `receiver` for a chat. Returns the pair's open room and whether
    /// this call created it; only a new room notifies the receiver.
    pub async fn request_chat(
        &self,
        actor: &Actor,
        sender: &str,
        receiver: &str,
    ) -> Result<(ChatRoom, bool), ChatError> {
        actor.require_self(sender, "sender")?;
        validate_counterpart(sender, receiver)?;

        let (room, created) = self
            .rooms
            .open_or_create(sender, receiver, RoomStatus::Waiting, None)
            .await?;

        if created {
            let event = ServerEvent::ReceiveNewChat {
                sender: sender.to_string(),
                sender_nickname: self.display_name(actor).await,
                chat_room_id: room.room_id.clone(),
                receiver: receiver.to_string(),
            };
            self.broadcaster.broadcast_to_users(&[receiver], &event).await;
        } else {
            debug!("{} re-requested chat with {}: room {} already open", sender, receiver, room.room_id);
        }

        Ok((room, created))
    }

    /// Receiver accepts a waiting room. The requester gets `chatAccepted`
    /// followed by the accepted room.
    pub async fn accept_chat(
        &self,
        actor: &Actor,
        sender: &str,
        receiver: &str,
        room_id: &str,
    ) -> Result<ChatRoom, ChatError> {
        let room = self.answer(actor, sender, receiver, room_id, RoomAction::Accept).await?;

        let accepted = ServerEvent::ChatAccepted {
            chat_room_id: room.room_id.clone(),
            receiver: receiver.to_string(),
            receiver_nickname: self.display_name(actor).await,
        };
        self.broadcaster.broadcast_to_users(&[sender], &accepted).await;
        self.broadcaster
            .broadcast_to_users(&[sender], &ServerEvent::RoomCreated(room.clone()))
            .await;

        Ok(room)
    }

    /// Receiver declines a waiting room. The row stays, marked `rejected`.
    pub async fn reject_chat(
        &self,
        actor: &Actor,
        sender: &str,
        receiver: &str,
        room_id: &str,
    ) -> Result<(ChatRoom, ServerEvent), ChatError> {
        let room = self.answer(actor, sender, receiver, room_id, RoomAction::Reject).await?;

        let rejected = ServerEvent::ChatRejected {
            chat_room_id: room.room_id.clone(),
            receiver: receiver.to_string(),
            receiver_nickname: self.display_name(actor).await,
        };
        self.broadcaster.broadcast_to_users(&[sender], &rejected).await;

        Ok((room, rejected))
    }

    async fn answer(
        &self,
        actor: &Actor,
        sender: &str,
        receiver: &str,
        room_id: &str,
        action: RoomAction,
    ) -> Result<ChatRoom, ChatError> {
        actor.require_self(receiver, "receiver")?;
        let room = self.room_for(actor, room_id, action).await?;
        if room.participant_a != sender {
            return Err(ChatError::Forbidden("sender does not match the room".into()));
        }

        let next = machine::next_status(room.status, action)?;
        self.rooms.transition(room_id, next).await
    }

    /// Legacy direct creation: the room starts out `accepted` and nobody
    /// else is notified. A `title` is kept in the room metadata.
    pub async fn create_room(
        &self,
        actor: &Actor,
        sender: &str,
        receiver: &str,
        title: Option<&str>,
    ) -> Result<(ChatRoom, bool), ChatError> {
        actor.require_self(sender, "sender")?;
        validate_counterpart(sender, receiver)?;
        let metadata = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| json!({ "title": t }));
        self.rooms
            .open_or_create(sender, receiver, RoomStatus::Accepted, metadata)
            .await
    }

    /// Store a message in an accepted room and push it to both participants.
    pub async fn send_message(
        &self,
        actor: &Actor,
        sender: &str,
        room_id: &str,
        outgoing: Outgoing,
    ) -> Result<ChatMessage, ChatError> {
        Ok(self.send_screened(actor, sender, room_id, outgoing).await?.message)
    }

    /// [`send_message`](Self::send_message), also returning what the safety
    /// check made of the submitted text.
    pub async fn send_screened(
        &self,
        actor: &Actor,
        sender: &str,
        room_id: &str,
        outgoing: Outgoing,
    ) -> Result<Screened, ChatError> {
        actor.require_self(sender, "sender")?;
        let room = self.room_for(actor, room_id, RoomAction::SendMessage).await?;
        machine::next_status(room.status, RoomAction::SendMessage)?;

        if outgoing.body.trim().is_empty() && outgoing.attachments.is_empty() {
            return Err(ChatError::BadRequest("message is empty".into()));
        }

        let original = outgoing.body;
        let verdict = if original.is_empty() {
            SafetyVerdict::safe(&original)
        } else {
            self.safety.check(&original).await
        };
        let body = if verdict.is_safe {
            original.clone()
        } else {
            if verdict.risk_level == RiskLevel::High {
                warn!("High-risk message from {} in {} was filtered", sender, room_id);
            } else {
                info!("Message from {} in {} was filtered", sender, room_id);
            }
            verdict.filtered_message.clone()
        };

        let message = self
            .messages
            .append(NewMessage {
                room_id: room_id.to_string(),
                sender_id: sender.to_string(),
                sender_nickname: actor.nickname.clone(),
                body,
                kind: outgoing.kind,
                attachments: outgoing.attachments,
            })
            .await?;

        // The message is stored at this point; a stale preview is only logged.
        if let Err(e) = self
            .rooms
            .touch(room_id, &message.body, message.timestamp)
            .await
        {
            warn!("Failed to touch room {} after message {}: {}", room_id, message.message_id, e);
        }

        let event = ServerEvent::NewMsg {
            chatroom_id: room_id.to_string(),
            message: message.clone(),
        };
        self.broadcaster
            .broadcast_to_users(&room.participants(), &event)
            .await;

        Ok(Screened {
            message,
            original,
            verdict,
        })
    }

    /// A page of history, oldest first. See [`MessageLog::history`].
    pub async fn history(
        &self,
        actor: &Actor,
        room_id: &str,
        limit: Option<u32>,
        before: Option<i64>,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        self.participant_room(actor, room_id).await?;
        let limit = limit
            .unwrap_or(self.config.history_default_limit)
            .clamp(1, self.config.history_max_limit.max(1));
        self.messages.history(room_id, limit, before).await
    }

    /// Every room of the actor, most recently active first, with unread
    /// counts and the other side's online flag.
    pub async fn list_rooms(&self, actor: &Actor) -> Result<Vec<ChatRoom>, ChatError> {
        let rooms = self.rooms.list_for_user(&actor.user_id).await?;
        try_join_all(
            rooms
                .into_iter()
                .map(|room| self.presence.decorate(room, &actor.user_id)),
        )
        .await
    }

    /// Leave an accepted room. The other participant gets `roomLeft`.
    pub async fn leave_room(&self, actor: &Actor, room_id: &str, user_id: &str) -> Result<(), ChatError> {
        actor.require_self(user_id, "userId")?;
        let room = self.room_for(actor, room_id, RoomAction::Leave).await?;
        let next = machine::next_status(room.status, RoomAction::Leave)?;

        if let Some(connection_id) = &actor.connection_id {
            self.registry.set_active_room(connection_id, None).await;
        }

        match self.config.leave_policy {
            LeavePolicy::Delete => {
                if !self.rooms.delete(room_id).await? {
                    return Err(ChatError::NotFound("chat room not found".into()));
                }
            }
            LeavePolicy::Retain => {
                self.rooms.transition(room_id, next).await?;
            }
        }

        info!("{} left room {}", user_id, room_id);
        let event = ServerEvent::RoomLeft {
            chatroom_id: room_id.to_string(),
            user_id: user_id.to_string(),
        };
        self.notify_other(&room, actor, event).await;
        Ok(())
    }

    /// Focus a room: remember it on the connection, mark it read up to now
    /// and tell the other side. Returns the read marker.
    pub async fn open_room(&self, actor: &Actor, room_id: &str, user_id: &str) -> Result<i64, ChatError> {
        actor.require_self(user_id, "userId")?;
        let room = self.participant_room(actor, room_id).await?;

        if let Some(connection_id) = &actor.connection_id {
            self.registry.set_active_room(connection_id, Some(room_id)).await;
        }

        let marker = self
            .messages
            .mark_read(room_id, user_id, self.clock.now_ms())
            .await?;
        self.notify_read(&room, actor, marker).await;
        Ok(marker)
    }

    /// Mark the room read up to `upto` (default: now).
    pub async fn mark_read(&self, actor: &Actor, room_id: &str, upto: Option<i64>) -> Result<ReadState, ChatError> {
        let room = self.participant_room(actor, room_id).await?;
        let upto = upto.unwrap_or_else(|| self.clock.now_ms());

        let marker = self.messages.mark_read(room_id, &actor.user_id, upto).await?;
        self.notify_read(&room, actor, marker).await;
        self.messages.read_state(room_id, &actor.user_id).await
    }

    pub async fn read_state(&self, actor: &Actor, room_id: &str) -> Result<ReadState, ChatError> {
        self.participant_room(actor, room_id).await?;
        self.messages.read_state(room_id, &actor.user_id).await
    }

    async fn notify_read(&self, room: &ChatRoom, actor: &Actor, marker: i64) {
        let event = ServerEvent::UpdateRead {
            chatroom_id: room.room_id.clone(),
            user_id: actor.user_id.clone(),
            last_read_timestamp: marker,
        };
        self.notify_other(room, actor, event).await;
    }

    /// Reply to the periodic location ping. Only presence is refreshed.
    pub async fn location_updated(
        &self,
        actor: &Actor,
        user_id: &str,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<(), ChatError> {
        actor.require_self(user_id, "userId")?;
        self.presence
            .refresh(user_id, actor.nickname.as_deref())
            .await?;
        debug!("{} reported location {:?}, {:?}", user_id, latitude, longitude);
        Ok(())
    }
}

fn validate_counterpart(sender: &str, receiver: &str) -> Result<(), ChatError> {
    if receiver.is_empty() {
        return Err(ChatError::BadRequest("receiver is required".into()));
    }
    if sender == receiver {
        return Err(ChatError::BadRequest("cannot start a chat with yourself".into()));
    }
    Ok(())
}
