use std::sync::Arc;

use tracing::warn;

use hellohere_db::{MessageStore, PresenceStore, Store};
use hellohere_types::models::ChatRoom;

use crate::error::ChatError;

/// Online flags and display names.
pub struct Presence {
    store: Arc<dyn Store>,
}

impl Presence {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn is_online(&self, user_id: &str) -> Result<bool, ChatError> {
        Ok(self.store.is_online(user_id).await?)
    }

    /// Mark the user online, e.g. on a location refresh.
    pub async fn refresh(&self, user_id: &str, nickname: Option<&str>) -> Result<(), ChatError> {
        Ok(self.store.set_online(user_id, nickname, true).await?)
    }

    /// Display name for notifications. Falls back to the user id.
    pub async fn display_name(&self, user_id: &str) -> String {
        match self.store.nickname(user_id).await {
            Ok(Some(nick)) => nick,
            Ok(None) => user_id.to_string(),
            Err(e) => {
                warn!("Nickname lookup for {} failed: {}", user_id, e);
                user_id.to_string()
            }
        }
    }

    /// Fill in the viewer-specific fields of a room listing.
    pub async fn decorate(&self, mut room: ChatRoom, viewer: &str) -> Result<ChatRoom, ChatError> {
        let after = self
            .store
            .last_read(&room.room_id, viewer)
            .await?
            .unwrap_or(0);
        let unread = self
            .store
            .count_messages_after(&room.room_id, viewer, after)
            .await?;

        let active = match room.other_participant(viewer) {
            Some(other) => self.store.is_online(other).await?,
            None => false,
        };

        room.unread_count = Some(unread);
        room.is_active = Some(active);
        Ok(room)
    }
}
