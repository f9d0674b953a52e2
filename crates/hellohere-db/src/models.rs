//! Database row types. These map directly to SQLite rows.
//! Conversion into the wire models parses the text-encoded columns.

use chrono::{DateTime, Utc};
use rusqlite::Row;

use hellohere_types::models::{ChatMessage, ChatRoom, ConnectionInfo, MessageKind, RoomStatus};

use crate::error::StoreError;

pub struct ConnectionRow {
    pub connection_id: String,
    pub user_id: String,
    pub nickname: Option<String>,
    pub active_room_id: Option<String>,
    pub connected_at: i64,
}

impl ConnectionRow {
    pub const COLUMNS: &'static str = "connection_id, user_id, nickname, active_room_id, connected_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            connection_id: row.get(0)?,
            user_id: row.get(1)?,
            nickname: row.get(2)?,
            active_room_id: row.get(3)?,
            connected_at: row.get(4)?,
        })
    }
}

impl From<ConnectionRow> for ConnectionInfo {
    fn from(row: ConnectionRow) -> Self {
        ConnectionInfo {
            connection_id: row.connection_id,
            user_id: row.user_id,
            nickname: row.nickname,
            active_room_id: row.active_room_id,
            connected_at: row.connected_at,
        }
    }
}

pub struct RoomRow {
    pub room_id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub status: String,
    pub last_message: Option<String>,
    pub last_activity: i64,
    pub updated_at: String,
    pub metadata: Option<String>,
}

impl RoomRow {
    pub const COLUMNS: &'static str =
        "room_id, participant_a, participant_b, status, last_message, last_activity, updated_at, metadata";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            room_id: row.get(0)?,
            participant_a: row.get(1)?,
            participant_b: row.get(2)?,
            status: row.get(3)?,
            last_message: row.get(4)?,
            last_activity: row.get(5)?,
            updated_at: row.get(6)?,
            metadata: row.get(7)?,
        })
    }

    pub fn into_room(self) -> Result<ChatRoom, StoreError> {
        let status = self
            .status
            .parse::<RoomStatus>()
            .map_err(|e| StoreError::Backend(format!("room {}: {}", self.room_id, e)))?;
        let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::Backend(format!("room {} updated_at: {}", self.room_id, e)))?;
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()?;

        Ok(ChatRoom {
            room_id: self.room_id,
            participant_a: self.participant_a,
            participant_b: self.participant_b,
            status,
            last_message: self.last_message,
            last_activity: self.last_activity,
            updated_at,
            unread_count: None,
            is_active: None,
            metadata,
        })
    }
}

pub struct MessageRow {
    pub message_id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_nickname: Option<String>,
    pub body: String,
    pub kind: String,
    pub attachments: String,
    pub timestamp: i64,
    pub read: bool,
    pub read_at: Option<i64>,
}

impl MessageRow {
    pub const COLUMNS: &'static str =
        "message_id, room_id, sender_id, sender_nickname, body, kind, attachments, timestamp, read, read_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            message_id: row.get(0)?,
            room_id: row.get(1)?,
            sender_id: row.get(2)?,
            sender_nickname: row.get(3)?,
            body: row.get(4)?,
            kind: row.get(5)?,
            attachments: row.get(6)?,
            timestamp: row.get(7)?,
            read: row.get(8)?,
            read_at: row.get(9)?,
        })
    }

    pub fn into_message(self) -> Result<ChatMessage, StoreError> {
        let kind = self
            .kind
            .parse::<MessageKind>()
            .map_err(|e| StoreError::Backend(format!("message {}: {}", self.message_id, e)))?;
        let attachments = serde_json::from_str(&self.attachments)?;

        Ok(ChatMessage {
            message_id: self.message_id,
            room_id: self.room_id,
            sender_id: self.sender_id,
            sender_nickname: self.sender_nickname,
            body: self.body,
            kind,
            attachments,
            timestamp: self.timestamp,
            read: self.read,
            read_at: self.read_at,
        })
    }
}
