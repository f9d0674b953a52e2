use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a 1:1 chat room.
///
/// `Waiting` and `Accepted` are non-terminal: at most one room per pair may
/// sit in either of them. `Rejected` and `Left` end the room's life; a fresh
/// request between the same two users creates a new room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Accepted,
    Rejected,
    Left,
}

impl RoomStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Left)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Left => "left",
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant: {}", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

impl FromStr for RoomStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "left" => Ok(Self::Left),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    System,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::System => "system",
        }
    }
}

impl FromStr for MessageKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "system" => Ok(Self::System),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Canonical key for an unordered participant pair: the two ids sorted, the
/// lower one length-prefixed so ids containing the separator cannot collide.
/// (A, B) and (B, A) index the same slot.
pub fn pair_key(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{}:{}|{}", lo.len(), lo, hi)
}

/// A live WebSocket session. Owned by the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub connection_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_room_id: Option<String>,
    pub connected_at: i64,
}

/// A durable 1:1 chat room.
///
/// `participant_a` is the user who requested the chat (wire name `sender`),
/// `participant_b` the one who has to accept it (wire name `receiver`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    #[serde(rename = "chatroomId")]
    pub room_id: String,
    #[serde(rename = "sender")]
    pub participant_a: String,
    #[serde(rename = "receiver")]
    pub participant_b: String,
    pub status: RoomStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    pub last_activity: i64,
    pub updated_at: DateTime<Utc>,
    /// Unread messages for the user the room is being shown to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<u64>,
    /// Whether the other participant currently has a live connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ChatRoom {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }

    /// The participant that is not `user_id`, or `None` if `user_id` is not in the room.
    pub fn other_participant(&self, user_id: &str) -> Option<&str> {
        if self.participant_a == user_id {
            Some(&self.participant_b)
        } else if self.participant_b == user_id {
            Some(&self.participant_a)
        } else {
            None
        }
    }

    pub fn participants(&self) -> [&str; 2] {
        [&self.participant_a, &self.participant_b]
    }

    pub fn pair_key(&self) -> String {
        pair_key(&self.participant_a, &self.participant_b)
    }

    /// True when the room's participants are exactly `{a, b}`, in either order.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.participant_a == a && self.participant_b == b)
            || (self.participant_a == b && self.participant_b == a)
    }
}

/// An immutable chat message. Only `read`/`read_at` change after the write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "id")]
    pub message_id: String,
    #[serde(rename = "chatroomId")]
    pub room_id: String,
    #[serde(rename = "sender")]
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_nickname: Option<String>,
    #[serde(rename = "message")]
    pub body: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    pub timestamp: i64,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> ChatRoom {
        ChatRoom {
            room_id: "r1".into(),
            participant_a: "alice".into(),
            participant_b: "bob".into(),
            status: RoomStatus::Waiting,
            last_message: None,
            last_activity: 0,
            updated_at: DateTime::default(),
            unread_count: None,
            is_active: None,
            metadata: None,
        }
    }

    #[test]
    fn test_pair_key_is_order_independent() {
        assert_eq!(pair_key("alice", "bob"), pair_key("bob", "alice"));
        assert_ne!(pair_key("alice", "bob"), pair_key("alice", "carol"));
    }

    #[test]
    fn test_pair_key_ids_with_separators_stay_distinct() {
        assert_ne!(pair_key("a#b", "c"), pair_key("a", "b#c"));
        assert_ne!(pair_key("a|b", "c"), pair_key("a", "b|c"));
        assert_ne!(pair_key("1:a", "b"), pair_key("1", "a:b"));
        assert_eq!(pair_key("a#b", "c"), pair_key("c", "a#b"));
    }

    #[test]
    fn test_other_participant() {
        let r = room();
        assert_eq!(r.other_participant("alice"), Some("bob"));
        assert_eq!(r.other_participant("bob"), Some("alice"));
        assert_eq!(r.other_participant("mallory"), None);
        assert!(!r.is_participant("mallory"));
        assert!(r.is_between("bob", "alice"));
        assert!(!r.is_between("alice", "mallory"));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!RoomStatus::Waiting.is_terminal());
        assert!(!RoomStatus::Accepted.is_terminal());
        assert!(RoomStatus::Rejected.is_terminal());
        assert!(RoomStatus::Left.is_terminal());
        assert_eq!("accepted".parse::<RoomStatus>(), Ok(RoomStatus::Accepted));
        assert!("deleted".parse::<RoomStatus>().is_err());
    }

    #[test]
    fn test_room_wire_names() {
        let json = serde_json::to_value(room()).unwrap();
        assert_eq!(json["chatroomId"], "r1");
        assert_eq!(json["sender"], "alice");
        assert_eq!(json["receiver"], "bob");
        assert_eq!(json["status"], "waiting");
        assert!(json.get("unreadCount").is_none());
    }
}
