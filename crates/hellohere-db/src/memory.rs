//! In-memory store.
//!
//! Keeps the same indexes the SQLite schema has (pair key -> open room,
//! user id -> connection ids) so lookups never scan. All state sits behind
//! one lock, which makes each trait call atomic.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use hellohere_types::models::{ChatMessage, ChatRoom, ConnectionInfo, RoomStatus, pair_key};

use crate::error::StoreError;
use crate::store::{ConnectionStore, MessageStore, PresenceStore, RoomStore};

#[derive(Debug, Default, Clone)]
struct UserPresence {
    nickname: Option<String>,
    online: bool,
}

#[derive(Default)]
struct MemoryInner {
    connections: HashMap<String, ConnectionInfo>,
    /// user_id -> connection ids
    user_connections: HashMap<String, HashSet<String>>,
    rooms: HashMap<String, ChatRoom>,
    /// pair key -> room id of the pair's non-terminal room
    open_pairs: HashMap<String, String>,
    /// room_id -> messages sorted by timestamp, ties in insertion order
    messages: HashMap<String, Vec<ChatMessage>>,
    users: HashMap<String, UserPresence>,
    /// (room_id, user_id) -> last read timestamp
    last_reads: HashMap<(String, String), i64>,
}

impl MemoryInner {
    fn unindex_pair(&mut self, room: &ChatRoom) {
        let key = room.pair_key();
        if self.open_pairs.get(&key) == Some(&room.room_id) {
            self.open_pairs.remove(&key);
        }
    }
}

/// Shared in-memory store. Clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn put_connection(&self, conn: &ConnectionInfo) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.connections.get(&conn.connection_id).cloned() {
            if existing.user_id != conn.user_id {
                if let Some(ids) = inner.user_connections.get_mut(&existing.user_id) {
                    ids.remove(&conn.connection_id);
                }
            }
            let updated = ConnectionInfo {
                user_id: conn.user_id.clone(),
                nickname: conn.nickname.clone(),
                ..existing
            };
            inner
                .user_connections
                .entry(conn.user_id.clone())
                .or_default()
                .insert(conn.connection_id.clone());
            inner.connections.insert(conn.connection_id.clone(), updated);
            return Ok(false);
        }

        inner
            .user_connections
            .entry(conn.user_id.clone())
            .or_default()
            .insert(conn.connection_id.clone());
        inner.connections.insert(conn.connection_id.clone(), conn.clone());
        Ok(true)
    }

    async fn get_connection(&self, connection_id: &str) -> Result<Option<ConnectionInfo>, StoreError> {
        Ok(self.inner.read().await.connections.get(connection_id).cloned())
    }

    async fn delete_connection(&self, connection_id: &str) -> Result<Option<ConnectionInfo>, StoreError> {
        let mut inner = self.inner.write().await;
        let removed = inner.connections.remove(connection_id);
        if let Some(conn) = &removed {
            let now_empty = match inner.user_connections.get_mut(&conn.user_id) {
                Some(ids) => {
                    ids.remove(connection_id);
                    ids.is_empty()
                }
                None => false,
            };
            if now_empty {
                inner.user_connections.remove(&conn.user_id);
            }
        }
        Ok(removed)
    }

    async fn connections_for_user(&self, user_id: &str) -> Result<Vec<ConnectionInfo>, StoreError> {
        let inner = self.inner.read().await;
        let conns = inner
            .user_connections
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.connections.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(conns)
    }

    async fn all_connections(&self) -> Result<Vec<ConnectionInfo>, StoreError> {
        Ok(self.inner.read().await.connections.values().cloned().collect())
    }

    async fn set_active_room(&self, connection_id: &str, room_id: Option<&str>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let conn = inner
            .connections
            .get_mut(connection_id)
            .ok_or_else(|| StoreError::NotFound(format!("connection {}", connection_id)))?;
        conn.active_room_id = room_id.map(str::to_string);
        Ok(())
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn insert_room(&self, room: &ChatRoom) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        if inner.rooms.contains_key(&room.room_id) {
            return Err(StoreError::Conflict(format!("room {} exists", room.room_id)));
        }

        if !room.status.is_terminal() {
            let key = room.pair_key();
            if inner.open_pairs.contains_key(&key) {
                return Err(StoreError::Conflict(format!("pair {} already has an open room", key)));
            }
            inner.open_pairs.insert(key, room.room_id.clone());
        }

        inner.rooms.insert(room.room_id.clone(), room.clone());
        Ok(())
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<ChatRoom>, StoreError> {
        Ok(self.inner.read().await.rooms.get(room_id).cloned())
    }

    async fn find_open_room(&self, a: &str, b: &str) -> Result<Option<ChatRoom>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .open_pairs
            .get(&pair_key(a, b))
            .and_then(|id| inner.rooms.get(id))
            .filter(|room| room.is_between(a, b))
            .cloned())
    }

    async fn update_status(
        &self,
        room_id: &str,
        expected: RoomStatus,
        new: RoomStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;

        let room = match inner.rooms.get_mut(room_id) {
            Some(room) if room.status == expected => room,
            _ => return Ok(false),
        };
        room.status = new;
        room.updated_at = updated_at;
        let snapshot = room.clone();

        if new.is_terminal() {
            inner.unindex_pair(&snapshot);
        }
        Ok(true)
    }

    async fn touch_room(
        &self,
        room_id: &str,
        last_message: &str,
        last_activity: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let room = inner
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| StoreError::NotFound(format!("room {}", room_id)))?;
        room.last_message = Some(last_message.to_string());
        room.last_activity = last_activity;
        room.updated_at = updated_at;
        Ok(())
    }

    async fn delete_room(&self, room_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.rooms.remove(room_id) {
            Some(room) => {
                inner.unindex_pair(&room);
                inner.messages.remove(room_id);
                inner.last_reads.retain(|(id, _), _| id != room_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<ChatRoom>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .rooms
            .values()
            .filter(|room| room.is_participant(user_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let log = inner.messages.entry(message.room_id.clone()).or_default();
        let at = log.partition_point(|m| m.timestamp <= message.timestamp);
        log.insert(at, message.clone());
        Ok(())
    }

    async fn query_messages(
        &self,
        room_id: &str,
        limit: usize,
        before: Option<i64>,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let inner = self.inner.read().await;
        let Some(log) = inner.messages.get(room_id) else {
            return Ok(vec![]);
        };

        Ok(log
            .iter()
            .rev()
            .filter(|m| before.is_none_or(|b| m.timestamp < b))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_messages_read(
        &self,
        room_id: &str,
        reader: &str,
        upto: i64,
        read_at: i64,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(log) = inner.messages.get_mut(room_id) else {
            return Ok(0);
        };

        let mut changed = 0;
        for m in log
            .iter_mut()
            .filter(|m| !m.read && m.sender_id != reader && m.timestamp <= upto)
        {
            m.read = true;
            m.read_at = Some(read_at);
            changed += 1;
        }
        Ok(changed)
    }

    async fn count_messages_after(&self, room_id: &str, reader: &str, after: i64) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .get(room_id)
            .map(|log| {
                log.iter()
                    .filter(|m| m.sender_id != reader && m.timestamp > after)
                    .count() as u64
            })
            .unwrap_or(0))
    }
}

#[async_trait]
impl PresenceStore for MemoryStore {
    async fn set_online(&self, user_id: &str, nickname: Option<&str>, online: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let user = inner.users.entry(user_id.to_string()).or_default();
        user.online = online;
        if let Some(nick) = nickname {
            user.nickname = Some(nick.to_string());
        }
        Ok(())
    }

    async fn is_online(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .get(user_id)
            .is_some_and(|u| u.online))
    }

    async fn nickname(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .get(user_id)
            .and_then(|u| u.nickname.clone()))
    }

    async fn set_last_read(&self, room_id: &str, user_id: &str, timestamp: i64) -> Result<i64, StoreError> {
        let mut inner = self.inner.write().await;
        let marker = inner
            .last_reads
            .entry((room_id.to_string(), user_id.to_string()))
            .or_insert(timestamp);
        *marker = (*marker).max(timestamp);
        Ok(*marker)
    }

    async fn last_read(&self, room_id: &str, user_id: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .last_reads
            .get(&(room_id.to_string(), user_id.to_string()))
            .copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hellohere_types::models::MessageKind;

    fn room(id: &str, a: &str, b: &str, status: RoomStatus) -> ChatRoom {
        ChatRoom {
            room_id: id.into(),
            participant_a: a.into(),
            participant_b: b.into(),
            status,
            last_message: None,
            last_activity: 0,
            updated_at: Utc::now(),
            unread_count: None,
            is_active: None,
            metadata: None,
        }
    }

    fn msg(room: &str, sender: &str, ts: i64) -> ChatMessage {
        ChatMessage {
            message_id: format!("{}-{}", sender, ts),
            room_id: room.into(),
            sender_id: sender.into(),
            sender_nickname: None,
            body: format!("at {}", ts),
            kind: MessageKind::Text,
            attachments: vec![],
            timestamp: ts,
            read: false,
            read_at: None,
        }
    }

    #[tokio::test]
    async fn test_open_pair_index_both_orderings() {
        let store = MemoryStore::new();
        store.insert_room(&room("r1", "a", "b", RoomStatus::Waiting)).await.unwrap();

        assert_eq!(store.find_open_room("a", "b").await.unwrap().unwrap().room_id, "r1");
        assert_eq!(store.find_open_room("b", "a").await.unwrap().unwrap().room_id, "r1");

        let dup = store.insert_room(&room("r2", "b", "a", RoomStatus::Waiting)).await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_terminal_status_frees_pair() {
        let store = MemoryStore::new();
        store.insert_room(&room("r1", "a", "b", RoomStatus::Waiting)).await.unwrap();

        assert!(store
            .update_status("r1", RoomStatus::Waiting, RoomStatus::Rejected, Utc::now())
            .await
            .unwrap());
        assert!(store.find_open_room("a", "b").await.unwrap().is_none());
        store.insert_room(&room("r2", "a", "b", RoomStatus::Waiting)).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_room_drops_messages_and_markers() {
        let store = MemoryStore::new();
        store.insert_room(&room("r1", "a", "b", RoomStatus::Accepted)).await.unwrap();
        store.insert_message(&msg("r1", "a", 100)).await.unwrap();
        store.set_last_read("r1", "b", 100).await.unwrap();

        assert!(store.delete_room("r1").await.unwrap());
        assert!(store.query_messages("r1", 10, None).await.unwrap().is_empty());
        assert_eq!(store.last_read("r1", "b").await.unwrap(), None);
        assert_eq!(store.count_messages_after("r1", "b", 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_conditional_status_write() {
        let store = MemoryStore::new();
        store.insert_room(&room("r1", "a", "b", RoomStatus::Accepted)).await.unwrap();

        let applied = store
            .update_status("r1", RoomStatus::Waiting, RoomStatus::Rejected, Utc::now())
            .await
            .unwrap();
        assert!(!applied);
        assert_eq!(store.get_room("r1").await.unwrap().unwrap().status, RoomStatus::Accepted);
    }

    #[tokio::test]
    async fn test_user_index_tracks_upserts() {
        let store = MemoryStore::new();
        let conn = ConnectionInfo {
            connection_id: "c1".into(),
            user_id: "a".into(),
            nickname: None,
            active_room_id: None,
            connected_at: 1,
        };

        assert!(store.put_connection(&conn).await.unwrap());
        store.set_active_room("c1", Some("r1")).await.unwrap();
        assert!(!store.put_connection(&conn).await.unwrap());

        let conns = store.connections_for_user("a").await.unwrap();
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].active_room_id.as_deref(), Some("r1"));

        store.delete_connection("c1").await.unwrap();
        assert!(store.connections_for_user("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_newest_first_with_ties_in_insertion_order() {
        let store = MemoryStore::new();
        let mut first = msg("r1", "a", 200);
        first.message_id = "first".into();
        let mut second = msg("r1", "a", 200);
        second.message_id = "second".into();

        store.insert_message(&msg("r1", "a", 300)).await.unwrap();
        store.insert_message(&first).await.unwrap();
        store.insert_message(&msg("r1", "a", 100)).await.unwrap();
        store.insert_message(&second).await.unwrap();

        let ids: Vec<String> = store
            .query_messages("r1", 10, None)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.message_id)
            .collect();
        assert_eq!(ids, vec!["a-300", "second", "first", "a-100"]);
    }

    #[tokio::test]
    async fn test_read_marker_never_moves_back() {
        let store = MemoryStore::new();
        assert_eq!(store.set_last_read("r1", "a", 500).await.unwrap(), 500);
        assert_eq!(store.set_last_read("r1", "a", 100).await.unwrap(), 500);
        assert_eq!(store.last_read("r1", "a").await.unwrap(), Some(500));
    }
}
