use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, ChatRoom, MessageKind};

// -- JWT Claims --

/// Token claims shared by the REST middleware and the WebSocket `$connect`
/// route. Issuers put the user id under `userId`; older tokens use `id` or `sub`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId", alias = "id", alias = "sub")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    pub exp: usize,
}

// -- Rooms --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateRoomRequest {
    pub target_user_id: String,
    /// Kept on a newly created room as `metadata.title`.
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RoomListResponse {
    pub rooms: Vec<ChatRoom>,
}

// -- Messages --

/// REST send. Older clients call the room `roomId` and may send
/// `language`/`targetLanguage`, which are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(alias = "roomId")]
    pub chatroom_id: String,
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub attachments: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub message_id: String,
    pub original_message: String,
    pub filtered_message: String,
    pub is_safe: bool,
    pub risk_level: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub chatroom_id: String,
    pub messages: Vec<ChatMessage>,
}

// -- Read tracking --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MarkReadRequest {
    /// Defaults to "now" when absent.
    #[serde(default)]
    pub upto: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadStateResponse {
    pub chatroom_id: String,
    pub last_read_timestamp: i64,
    pub unread_count: u64,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub reason: String,
}
