//! Store abstraction for the chat core.
//!
//! The core treats persistence as a generic keyed table with point lookups,
//! index queries, conditional updates and deletes. Two implementations ship
//! with the crate: [`crate::MemoryStore`] for tests and single-process runs,
//! and [`crate::Database`] backed by SQLite.
//!
//! # Index contract
//!
//! - Rooms are indexed by the canonical pair key ([`hellohere_types::models::pair_key`]),
//!   so [`RoomStore::find_open_room`] is a point lookup rather than a table scan.
//!   At most one non-terminal room may hold a pair key; a second insert fails
//!   with [`StoreError::Conflict`].
//! - Connections are indexed by user id, so [`ConnectionStore::connections_for_user`]
//!   does not scan the connection table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use hellohere_types::models::{ChatMessage, ChatRoom, ConnectionInfo, RoomStatus};

use crate::error::StoreError;

/// Live connection rows, keyed by connection id.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Upsert keyed by `connection_id`. Returns `true` if the row was new.
    ///
    /// An existing row keeps its `active_room_id` and `connected_at`.
    async fn put_connection(&self, conn: &ConnectionInfo) -> Result<bool, StoreError>;

    async fn get_connection(&self, connection_id: &str) -> Result<Option<ConnectionInfo>, StoreError>;

    /// Remove the row, returning it if it existed.
    async fn delete_connection(&self, connection_id: &str) -> Result<Option<ConnectionInfo>, StoreError>;

    async fn connections_for_user(&self, user_id: &str) -> Result<Vec<ConnectionInfo>, StoreError>;

    async fn all_connections(&self) -> Result<Vec<ConnectionInfo>, StoreError>;

    /// Set or clear the room a connection has open.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the connection row is gone.
    async fn set_active_room(&self, connection_id: &str, room_id: Option<&str>) -> Result<(), StoreError>;
}

/// Durable chat-room rows, keyed by room id.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if `room` is non-terminal and the pair
    /// already has a non-terminal room.
    async fn insert_room(&self, room: &ChatRoom) -> Result<(), StoreError>;

    async fn get_room(&self, room_id: &str) -> Result<Option<ChatRoom>, StoreError>;

    /// The non-terminal room for the unordered pair `{a, b}`, if any.
    async fn find_open_room(&self, a: &str, b: &str) -> Result<Option<ChatRoom>, StoreError>;

    /// Conditional status write.
    ///
    /// Applies only while the stored status still equals `expected`. Returns
    /// `false` (and writes nothing) if the row is missing or has moved on.
    async fn update_status(
        &self,
        room_id: &str,
        expected: RoomStatus,
        new: RoomStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Record the latest message preview and activity time.
    async fn touch_room(
        &self,
        room_id: &str,
        last_message: &str,
        last_activity: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Removes the room together with its messages and read markers.
    /// Returns `true` if a room was removed.
    async fn delete_room(&self, room_id: &str) -> Result<bool, StoreError>;

    /// Every room where `user_id` is either participant, in no particular order.
    async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<ChatRoom>, StoreError>;
}

/// Append-only per-room message log.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, message: &ChatMessage) -> Result<(), StoreError>;

    /// Newest first: at most `limit` messages with `timestamp < before` (if
    /// given). Equal timestamps are ordered by insertion.
    async fn query_messages(
        &self,
        room_id: &str,
        limit: usize,
        before: Option<i64>,
    ) -> Result<Vec<ChatMessage>, StoreError>;

    /// Flip `read`/`read_at` on unread messages not sent by `reader` with
    /// `timestamp <= upto`. Returns how many rows changed.
    async fn mark_messages_read(
        &self,
        room_id: &str,
        reader: &str,
        upto: i64,
        read_at: i64,
    ) -> Result<u64, StoreError>;

    /// Messages not sent by `reader` with `timestamp > after`.
    async fn count_messages_after(&self, room_id: &str, reader: &str, after: i64) -> Result<u64, StoreError>;
}

/// Presence flag, nickname and per-room read markers for users.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Set the online flag, remembering `nickname` when one is given.
    async fn set_online(&self, user_id: &str, nickname: Option<&str>, online: bool) -> Result<(), StoreError>;

    async fn is_online(&self, user_id: &str) -> Result<bool, StoreError>;

    async fn nickname(&self, user_id: &str) -> Result<Option<String>, StoreError>;

    /// Advance the read marker. Never moves it backwards.
    async fn set_last_read(&self, room_id: &str, user_id: &str, timestamp: i64) -> Result<i64, StoreError>;

    async fn last_read(&self, room_id: &str, user_id: &str) -> Result<Option<i64>, StoreError>;
}

/// Everything the chat core needs from persistence.
pub trait Store: ConnectionStore + RoomStore + MessageStore + PresenceStore {}

impl<T> Store for T where T: ConnectionStore + RoomStore + MessageStore + PresenceStore {}
