use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use serde_json::Value;

use hellohere_db::{RoomStore, Store};
use hellohere_types::models::{ChatRoom, RoomStatus};

use crate::clock::Clock;
use crate::error::ChatError;
use crate::machine;

/// Durable room records and their status transitions.
pub struct RoomService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl RoomService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The open (`waiting` or `accepted`) room for the pair, in either order.
    pub async fn find_by_pair(&self, a: &str, b: &str) -> Result<Option<ChatRoom>, ChatError> {
        Ok(self.store.find_open_room(a, b).await?)
    }

    /// Insert a fresh room with `sender` as participant A.
    pub async fn create(
        &self,
        sender: &str,
        receiver: &str,
        status: RoomStatus,
        metadata: Option<Value>,
    ) -> Result<ChatRoom, ChatError> {
        let room = ChatRoom {
            room_id: Uuid::new_v4().to_string(),
            participant_a: sender.to_string(),
            participant_b: receiver.to_string(),
            status,
            last_message: None,
            last_activity: self.clock.now_ms(),
            updated_at: self.clock.now(),
            unread_count: None,
            is_active: None,
            metadata,
        };
        self.store.insert_room(&room).await?;
        info!(
            "Room {} created for {} -> {} ({})",
            room.room_id, sender, receiver, status
        );
        Ok(room)
    }

    /// Return the pair's open room, creating one in `status` if there is none.
    /// The flag is `true` when this call created the room. `metadata` only
    /// lands on a newly created room.
    ///
    /// Two callers racing on the same pair both end up with the one room the
    /// store accepted.
    pub async fn open_or_create(
        &self,
        sender: &str,
        receiver: &str,
        status: RoomStatus,
        metadata: Option<Value>,
    ) -> Result<(ChatRoom, bool), ChatError> {
        if let Some(existing) = self.find_by_pair(sender, receiver).await? {
            return Ok((existing, false));
        }

        match self.create(sender, receiver, status, metadata).await {
            Ok(room) => Ok((room, true)),
            Err(ChatError::Conflict(_)) => {
                debug!("Lost room creation race for {} / {}", sender, receiver);
                let winner = self.find_by_pair(sender, receiver).await?.ok_or_else(|| {
                    ChatError::Internal(format!(
                        "pair {} / {} conflicted but has no open room",
                        sender, receiver
                    ))
                })?;
                Ok((winner, false))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get(&self, room_id: &str) -> Result<Option<ChatRoom>, ChatError> {
        Ok(self.store.get_room(room_id).await?)
    }

    pub async fn require(&self, room_id: &str) -> Result<ChatRoom, ChatError> {
        self.get(room_id)
            .await?
            .ok_or_else(|| ChatError::NotFound("chat room not found".into()))
    }

    /// Move a room to `new_status`.
    ///
    /// The current status is re-read and validated, and the write only lands
    /// if nobody changed the status in between.
    pub async fn transition(&self, room_id: &str, new_status: RoomStatus) -> Result<ChatRoom, ChatError> {
        let room = self.require(room_id).await?;
        if !machine::can_transition(room.status, new_status) {
            return Err(ChatError::Conflict(format!(
                "room is {}, cannot become {}",
                room.status, new_status
            )));
        }

        let now = self.clock.now();
        let applied = self
            .store
            .update_status(room_id, room.status, new_status, now)
            .await?;
        if !applied {
            return Err(ChatError::Conflict("room changed concurrently".into()));
        }

        info!("Room {}: {} -> {}", room_id, room.status, new_status);
        Ok(ChatRoom {
            status: new_status,
            updated_at: now,
            ..room
        })
    }

    /// Record a message preview and bump the activity time.
    pub async fn touch(&self, room_id: &str, last_message: &str, at: i64) -> Result<(), ChatError> {
        Ok(self
            .store
            .touch_room(room_id, last_message, at, self.clock.now())
            .await?)
    }

    pub async fn delete(&self, room_id: &str) -> Result<bool, ChatError> {
        let removed = self.store.delete_room(room_id).await?;
        if removed {
            info!("Room {} deleted", room_id);
        }
        Ok(removed)
    }

    /// Every room the user is in, most recently active first.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<ChatRoom>, ChatError> {
        let mut rooms = self.store.rooms_for_user(user_id).await?;
        rooms.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(rooms)
    }
}
