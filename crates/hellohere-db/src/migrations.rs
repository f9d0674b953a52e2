use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            nickname    TEXT,
            online      INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS connections (
            connection_id   TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            nickname        TEXT,
            active_room_id  TEXT,
            connected_at    INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_connections_user
            ON connections(user_id);

        CREATE TABLE IF NOT EXISTS chat_rooms (
            room_id         TEXT PRIMARY KEY,
            participant_a   TEXT NOT NULL,
            participant_b   TEXT NOT NULL,
            pair_key        TEXT NOT NULL,
            status          TEXT NOT NULL,
            last_message    TEXT,
            last_activity   INTEGER NOT NULL,
            updated_at      TEXT NOT NULL,
            metadata        TEXT
        );

        -- At most one waiting/accepted room per unordered pair
        CREATE UNIQUE INDEX IF NOT EXISTS idx_rooms_open_pair
            ON chat_rooms(pair_key) WHERE status IN ('waiting', 'accepted');

        CREATE INDEX IF NOT EXISTS idx_rooms_participant_a
            ON chat_rooms(participant_a);

        CREATE INDEX IF NOT EXISTS idx_rooms_participant_b
            ON chat_rooms(participant_b);

        CREATE TABLE IF NOT EXISTS chat_messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id      TEXT NOT NULL UNIQUE,
            room_id         TEXT NOT NULL,
            sender_id       TEXT NOT NULL,
            sender_nickname TEXT,
            body            TEXT NOT NULL,
            kind            TEXT NOT NULL,
            attachments     TEXT NOT NULL DEFAULT '[]',
            timestamp       INTEGER NOT NULL,
            read            INTEGER NOT NULL DEFAULT 0,
            read_at         INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON chat_messages(room_id, timestamp, seq);

        CREATE TABLE IF NOT EXISTS room_reads (
            room_id     TEXT NOT NULL,
            user_id     TEXT NOT NULL,
            last_read   INTEGER NOT NULL,
            PRIMARY KEY (room_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
