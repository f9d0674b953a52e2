use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use hellohere_types::models::{ChatMessage, ChatRoom, ConnectionInfo, RoomStatus, pair_key};

use crate::Database;
use crate::error::StoreError;
use crate::models::{ConnectionRow, MessageRow, RoomRow};
use crate::store::{ConnectionStore, MessageStore, PresenceStore, RoomStore};

// -- Connections --

fn query_connection(conn: &Connection, connection_id: &str) -> Result<Option<ConnectionInfo>, StoreError> {
    let sql = format!("SELECT {} FROM connections WHERE connection_id = ?1", ConnectionRow::COLUMNS);
    let row = conn
        .query_row(&sql, [connection_id], ConnectionRow::from_row)
        .optional()?;
    Ok(row.map(ConnectionInfo::from))
}

fn query_connections(conn: &Connection, sql: &str, args: &[&str]) -> Result<Vec<ConnectionInfo>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(args), ConnectionRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().map(ConnectionInfo::from).collect())
}

#[async_trait]
impl ConnectionStore for Database {
    async fn put_connection(&self, info: &ConnectionInfo) -> Result<bool, StoreError> {
        let info = info.clone();
        self.run(move |conn| {
            let existed = query_connection(conn, &info.connection_id)?.is_some();
            conn.execute(
                "INSERT INTO connections (connection_id, user_id, nickname, active_room_id, connected_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(connection_id) DO UPDATE SET
                    user_id = excluded.user_id,
                    nickname = excluded.nickname",
                params![
                    info.connection_id,
                    info.user_id,
                    info.nickname,
                    info.active_room_id,
                    info.connected_at
                ],
            )?;
            Ok(!existed)
        })
        .await
    }

    async fn get_connection(&self, connection_id: &str) -> Result<Option<ConnectionInfo>, StoreError> {
        let id = connection_id.to_string();
        self.run(move |conn| query_connection(conn, &id)).await
    }

    async fn delete_connection(&self, connection_id: &str) -> Result<Option<ConnectionInfo>, StoreError> {
        let id = connection_id.to_string();
        self.run(move |conn| {
            let existing = query_connection(conn, &id)?;
            if existing.is_some() {
                conn.execute("DELETE FROM connections WHERE connection_id = ?1", [&id])?;
            }
            Ok(existing)
        })
        .await
    }

    async fn connections_for_user(&self, user_id: &str) -> Result<Vec<ConnectionInfo>, StoreError> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let sql = format!("SELECT {} FROM connections WHERE user_id = ?1", ConnectionRow::COLUMNS);
            query_connections(conn, &sql, &[user_id.as_str()])
        })
        .await
    }

    async fn all_connections(&self) -> Result<Vec<ConnectionInfo>, StoreError> {
        self.run(|conn| {
            let sql = format!("SELECT {} FROM connections", ConnectionRow::COLUMNS);
            query_connections(conn, &sql, &[])
        })
        .await
    }

    async fn set_active_room(&self, connection_id: &str, room_id: Option<&str>) -> Result<(), StoreError> {
        let id = connection_id.to_string();
        let room_id = room_id.map(str::to_string);
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE connections SET active_room_id = ?1 WHERE connection_id = ?2",
                params![room_id, id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("connection {}", id)));
            }
            Ok(())
        })
        .await
    }
}

// -- Rooms --

fn query_room(conn: &Connection, sql: &str, args: &[&str]) -> Result<Option<ChatRoom>, StoreError> {
    conn.query_row(sql, rusqlite::params_from_iter(args), RoomRow::from_row)
        .optional()?
        .map(RoomRow::into_room)
        .transpose()
}

#[async_trait]
impl RoomStore for Database {
    async fn insert_room(&self, room: &ChatRoom) -> Result<(), StoreError> {
        let room = room.clone();
        self.run(move |conn| {
            let metadata = room.metadata.as_ref().map(serde_json::to_string).transpose()?;
            conn.execute(
                "INSERT INTO chat_rooms
                    (room_id, participant_a, participant_b, pair_key, status, last_message, last_activity, updated_at, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    room.room_id,
                    room.participant_a,
                    room.participant_b,
                    room.pair_key(),
                    room.status.as_str(),
                    room.last_message,
                    room.last_activity,
                    room.updated_at.to_rfc3339(),
                    metadata
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<ChatRoom>, StoreError> {
        let id = room_id.to_string();
        self.run(move |conn| {
            let sql = format!("SELECT {} FROM chat_rooms WHERE room_id = ?1", RoomRow::COLUMNS);
            query_room(conn, &sql, &[id.as_str()])
        })
        .await
    }

    async fn find_open_room(&self, a: &str, b: &str) -> Result<Option<ChatRoom>, StoreError> {
        let key = pair_key(a, b);
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM chat_rooms WHERE pair_key = ?1 AND status IN ('waiting', 'accepted')",
                RoomRow::COLUMNS
            );
            query_room(conn, &sql, &[key.as_str()])
        })
        .await
        .map(|room| room.filter(|r| r.is_between(a, b)))
    }

    async fn update_status(
        &self,
        room_id: &str,
        expected: RoomStatus,
        new: RoomStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let id = room_id.to_string();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE chat_rooms SET status = ?1, updated_at = ?2 WHERE room_id = ?3 AND status = ?4",
                params![new.as_str(), updated_at.to_rfc3339(), id, expected.as_str()],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn touch_room(
        &self,
        room_id: &str,
        last_message: &str,
        last_activity: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let id = room_id.to_string();
        let last_message = last_message.to_string();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE chat_rooms SET last_message = ?1, last_activity = ?2, updated_at = ?3 WHERE room_id = ?4",
                params![last_message, last_activity, updated_at.to_rfc3339(), id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("room {}", id)));
            }
            Ok(())
        })
        .await
    }

    async fn delete_room(&self, room_id: &str) -> Result<bool, StoreError> {
        let id = room_id.to_string();
        self.run(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let removed = tx.execute("DELETE FROM chat_rooms WHERE room_id = ?1", [&id])? > 0;
            if removed {
                tx.execute("DELETE FROM chat_messages WHERE room_id = ?1", [&id])?;
                tx.execute("DELETE FROM room_reads WHERE room_id = ?1", [&id])?;
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<ChatRoom>, StoreError> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM chat_rooms WHERE participant_a = ?1 OR participant_b = ?1",
                RoomRow::COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([&user_id], RoomRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(RoomRow::into_room).collect()
        })
        .await
    }
}

// -- Messages --

#[async_trait]
impl MessageStore for Database {
    async fn insert_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        let m = message.clone();
        self.run(move |conn| {
            let attachments = serde_json::to_string(&m.attachments)?;
            conn.execute(
                "INSERT INTO chat_messages
                    (message_id, room_id, sender_id, sender_nickname, body, kind, attachments, timestamp, read, read_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    m.message_id,
                    m.room_id,
                    m.sender_id,
                    m.sender_nickname,
                    m.body,
                    m.kind.as_str(),
                    attachments,
                    m.timestamp,
                    m.read,
                    m.read_at
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn query_messages(
        &self,
        room_id: &str,
        limit: usize,
        before: Option<i64>,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let room_id = room_id.to_string();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM chat_messages
                 WHERE room_id = ?1 AND (?2 IS NULL OR timestamp < ?2)
                 ORDER BY timestamp DESC, seq DESC
                 LIMIT ?3",
                MessageRow::COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![room_id, before, limit as i64], MessageRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(MessageRow::into_message).collect()
        })
        .await
    }

    async fn mark_messages_read(
        &self,
        room_id: &str,
        reader: &str,
        upto: i64,
        read_at: i64,
    ) -> Result<u64, StoreError> {
        let room_id = room_id.to_string();
        let reader = reader.to_string();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE chat_messages SET read = 1, read_at = ?1
                 WHERE room_id = ?2 AND sender_id != ?3 AND read = 0 AND timestamp <= ?4",
                params![read_at, room_id, reader, upto],
            )?;
            Ok(changed as u64)
        })
        .await
    }

    async fn count_messages_after(&self, room_id: &str, reader: &str, after: i64) -> Result<u64, StoreError> {
        let room_id = room_id.to_string();
        let reader = reader.to_string();
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM chat_messages WHERE room_id = ?1 AND sender_id != ?2 AND timestamp > ?3",
                params![room_id, reader, after],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }
}

// -- Presence & read markers --

#[async_trait]
impl PresenceStore for Database {
    async fn set_online(&self, user_id: &str, nickname: Option<&str>, online: bool) -> Result<(), StoreError> {
        let user_id = user_id.to_string();
        let nickname = nickname.map(str::to_string);
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO users (id, nickname, online) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    online = excluded.online,
                    nickname = COALESCE(excluded.nickname, users.nickname)",
                params![user_id, nickname, online],
            )?;
            Ok(())
        })
        .await
    }

    async fn is_online(&self, user_id: &str) -> Result<bool, StoreError> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let online: Option<bool> = conn
                .query_row("SELECT online FROM users WHERE id = ?1", [&user_id], |row| row.get(0))
                .optional()?;
            Ok(online.unwrap_or(false))
        })
        .await
    }

    async fn nickname(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let nickname: Option<Option<String>> = conn
                .query_row("SELECT nickname FROM users WHERE id = ?1", [&user_id], |row| row.get(0))
                .optional()?;
            Ok(nickname.flatten())
        })
        .await
    }

    async fn set_last_read(&self, room_id: &str, user_id: &str, timestamp: i64) -> Result<i64, StoreError> {
        let room_id = room_id.to_string();
        let user_id = user_id.to_string();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO room_reads (room_id, user_id, last_read) VALUES (?1, ?2, ?3)
                 ON CONFLICT(room_id, user_id) DO UPDATE SET
                    last_read = MAX(room_reads.last_read, excluded.last_read)",
                params![room_id, user_id, timestamp],
            )?;
            let marker: i64 = conn.query_row(
                "SELECT last_read FROM room_reads WHERE room_id = ?1 AND user_id = ?2",
                params![room_id, user_id],
                |row| row.get(0),
            )?;
            Ok(marker)
        })
        .await
    }

    async fn last_read(&self, room_id: &str, user_id: &str) -> Result<Option<i64>, StoreError> {
        let room_id = room_id.to_string();
        let user_id = user_id.to_string();
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT last_read FROM room_reads WHERE room_id = ?1 AND user_id = ?2",
                    params![room_id, user_id],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }
}
