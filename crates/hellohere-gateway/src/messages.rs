use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use hellohere_db::{MessageStore, PresenceStore, Store};
use hellohere_types::models::{ChatMessage, MessageKind};

use crate::clock::Clock;
use crate::error::ChatError;

/// A message as submitted, before it gets an id and a timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room_id: String,
    pub sender_id: String,
    pub sender_nickname: Option<String>,
    pub body: String,
    pub kind: MessageKind,
    pub attachments: Vec<String>,
}

/// Where a user stands in a room's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadState {
    pub last_read: i64,
    pub unread: u64,
}

/// Append-only message history per room, plus read tracking.
pub struct MessageLog {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl MessageLog {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn append(&self, new: NewMessage) -> Result<ChatMessage, ChatError> {
        let message = ChatMessage {
            message_id: Uuid::new_v4().to_string(),
            room_id: new.room_id,
            sender_id: new.sender_id,
            sender_nickname: new.sender_nickname,
            body: new.body,
            kind: new.kind,
            attachments: new.attachments,
            timestamp: self.clock.now_ms(),
            read: false,
            read_at: None,
        };
        self.store.insert_message(&message).await?;
        debug!(
            "Message {} appended to {} at {}",
            message.message_id, message.room_id, message.timestamp
        );
        Ok(message)
    }

    /// Up to `limit` messages older than `before`, oldest first.
    ///
    /// Without `before` this is the latest page. Passing the timestamp of the
    /// first message of a page fetches the page before it.
    pub async fn history(
        &self,
        room_id: &str,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let mut page = self
            .store
            .query_messages(room_id, limit as usize, before)
            .await?;
        page.reverse();
        Ok(page)
    }

    /// Mark everything the other side sent up to `upto` as read by `user_id`.
    /// Returns the read marker, which never moves backwards.
    pub async fn mark_read(&self, room_id: &str, user_id: &str, upto: i64) -> Result<i64, ChatError> {
        let flipped = self
            .store
            .mark_messages_read(room_id, user_id, upto, self.clock.now_ms())
            .await?;
        let marker = self.store.set_last_read(room_id, user_id, upto).await?;
        debug!(
            "{} read {} up to {} ({} newly read)",
            user_id, room_id, marker, flipped
        );
        Ok(marker)
    }

    pub async fn unread_count(&self, room_id: &str, user_id: &str) -> Result<u64, ChatError> {
        Ok(self.read_state(room_id, user_id).await?.unread)
    }

    pub async fn read_state(&self, room_id: &str, user_id: &str) -> Result<ReadState, ChatError> {
        let last_read = self.store.last_read(room_id, user_id).await?.unwrap_or(0);
        let unread = self
            .store
            .count_messages_after(room_id, user_id, last_read)
            .await?;
        Ok(ReadState { last_read, unread })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use hellohere_db::MemoryStore;

    fn log() -> (MessageLog, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(100));
        let log = MessageLog::new(Arc::new(MemoryStore::new()), clock.clone());
        (log, clock)
    }

    fn text(sender: &str, body: &str) -> NewMessage {
        NewMessage {
            room_id: "r1".into(),
            sender_id: sender.into(),
            sender_nickname: None,
            body: body.into(),
            kind: MessageKind::Text,
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_history_pages_backwards() {
        let (log, clock) = log();
        for ts in [100, 200, 300] {
            clock.set(ts);
            log.append(text("alice", &ts.to_string())).await.unwrap();
        }

        let stamps = |page: Vec<ChatMessage>| page.iter().map(|m| m.timestamp).collect::<Vec<_>>();

        assert_eq!(stamps(log.history("r1", 2, None).await.unwrap()), vec![200, 300]);
        assert_eq!(stamps(log.history("r1", 2, Some(300)).await.unwrap()), vec![100, 200]);
        assert_eq!(stamps(log.history("r1", 2, Some(100)).await.unwrap()), Vec::<i64>::new());
    }

    #[tokio::test]
    async fn test_read_state_counts_only_the_other_side() {
        let (log, clock) = log();
        clock.set(100);
        log.append(text("alice", "hi")).await.unwrap();
        clock.set(200);
        log.append(text("bob", "hey")).await.unwrap();
        clock.set(300);
        log.append(text("alice", "how are you")).await.unwrap();

        assert_eq!(log.unread_count("r1", "bob").await.unwrap(), 2);
        assert_eq!(log.mark_read("r1", "bob", 150).await.unwrap(), 150);
        assert_eq!(
            log.read_state("r1", "bob").await.unwrap(),
            ReadState { last_read: 150, unread: 1 }
        );

        // Marker never goes back.
        assert_eq!(log.mark_read("r1", "bob", 50).await.unwrap(), 150);
        assert_eq!(log.unread_count("r1", "alice").await.unwrap(), 1);
    }
}
