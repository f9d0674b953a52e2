use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, ChatRoom, MessageKind};

/// Actions sent FROM client TO server over the WebSocket, as `{action, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum ClientAction {
    /// Ask another user for a chat; creates a `waiting` room
    #[serde(rename_all = "camelCase")]
    RequestNewChat { sender: String, receiver: String },

    /// Receiver accepts a pending request
    #[serde(rename_all = "camelCase")]
    AcceptNewChat {
        sender: String,
        receiver: String,
        chat_room_id: String,
    },

    /// Receiver declines a pending request
    #[serde(rename_all = "camelCase")]
    RejectNewChat {
        sender: String,
        receiver: String,
        chat_room_id: String,
    },

    /// Legacy path: creates the room already accepted
    #[serde(rename_all = "camelCase")]
    CreateRoom { sender: String, receiver: String },

    #[serde(rename_all = "camelCase")]
    SendChatMsg {
        sender: String,
        chatroom_id: String,
        message: String,
        #[serde(rename = "type", default)]
        kind: MessageKind,
        #[serde(default)]
        attachments: Vec<String>,
    },

    #[serde(rename_all = "camelCase")]
    GetChatHistory {
        chatroom_id: String,
        #[serde(default)]
        limit: Option<u32>,
        #[serde(default)]
        before: Option<i64>,
    },

    GetChatRooms {},

    #[serde(rename_all = "camelCase")]
    LeaveChatRoom { chatroom_id: String, user_id: String },

    #[serde(rename_all = "camelCase")]
    OpenChatRoom { chatroom_id: String, user_id: String },

    /// Reply to the periodic `updateUserLocation` ping
    #[serde(rename_all = "camelCase")]
    UpdateUserLocationSuccess {
        user_id: String,
        #[serde(default)]
        latitude: Option<f64>,
        #[serde(default)]
        longitude: Option<f64>,
        #[serde(default)]
        updated_at: Option<String>,
    },
}

impl ClientAction {
    /// Wire tag of this action, used in logs and error envelopes.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestNewChat { .. } => "requestNewChat",
            Self::AcceptNewChat { .. } => "acceptNewChat",
            Self::RejectNewChat { .. } => "rejectNewChat",
            Self::CreateRoom { .. } => "createRoom",
            Self::SendChatMsg { .. } => "sendChatMsg",
            Self::GetChatHistory { .. } => "getChatHistory",
            Self::GetChatRooms {} => "getChatRooms",
            Self::LeaveChatRoom { .. } => "leaveChatRoom",
            Self::OpenChatRoom { .. } => "openChatRoom",
            Self::UpdateUserLocationSuccess { .. } => "updateUserLocationSuccess",
        }
    }
}

/// Events sent FROM server TO client over the WebSocket, as `{action, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Someone asked the recipient for a chat
    #[serde(rename_all = "camelCase")]
    ReceiveNewChat {
        sender: String,
        sender_nickname: String,
        chat_room_id: String,
        receiver: String,
    },

    /// The requester's chat was accepted
    #[serde(rename_all = "camelCase")]
    ChatAccepted {
        chat_room_id: String,
        receiver: String,
        receiver_nickname: String,
    },

    /// The requester's chat was declined
    #[serde(rename_all = "camelCase")]
    ChatRejected {
        chat_room_id: String,
        receiver: String,
        receiver_nickname: String,
    },

    /// Full room record (new, existing, or freshly accepted)
    RoomCreated(ChatRoom),

    #[serde(rename_all = "camelCase")]
    NewMsg {
        chatroom_id: String,
        message: ChatMessage,
    },

    #[serde(rename_all = "camelCase")]
    ChatHistory {
        chatroom_id: String,
        messages: Vec<ChatMessage>,
    },

    ChatRoomsList { rooms: Vec<ChatRoom> },

    #[serde(rename_all = "camelCase")]
    LeaveRoomResponse {
        chatroom_id: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// The other participant left the room
    #[serde(rename_all = "camelCase")]
    RoomLeft { chatroom_id: String, user_id: String },

    /// The other participant read the room up to `last_read_timestamp`
    #[serde(rename_all = "camelCase")]
    UpdateRead {
        chatroom_id: String,
        user_id: String,
        last_read_timestamp: i64,
    },

    /// Periodic request for a location refresh
    UpdateUserLocation {},

    /// A rejected action, in the same envelope as successes
    Error {
        action: String,
        status: u16,
        reason: String,
    },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReceiveNewChat { .. } => "receiveNewChat",
            Self::ChatAccepted { .. } => "chatAccepted",
            Self::ChatRejected { .. } => "chatRejected",
            Self::RoomCreated(_) => "roomCreated",
            Self::NewMsg { .. } => "newMsg",
            Self::ChatHistory { .. } => "chatHistory",
            Self::ChatRoomsList { .. } => "chatRoomsList",
            Self::LeaveRoomResponse { .. } => "leaveRoomResponse",
            Self::RoomLeft { .. } => "roomLeft",
            Self::UpdateRead { .. } => "updateRead",
            Self::UpdateUserLocation {} => "updateUserLocation",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_accept_uses_camel_case_room_id() {
        let raw = json!({
            "action": "acceptNewChat",
            "data": { "sender": "a", "receiver": "b", "chatRoomId": "r1" }
        });
        let action: ClientAction = serde_json::from_value(raw).unwrap();
        assert_eq!(
            action,
            ClientAction::AcceptNewChat {
                sender: "a".into(),
                receiver: "b".into(),
                chat_room_id: "r1".into(),
            }
        );
    }

    #[test]
    fn test_parse_send_defaults() {
        let raw = json!({
            "action": "sendChatMsg",
            "data": { "sender": "a", "chatroomId": "r1", "message": "hi" }
        });
        match serde_json::from_value::<ClientAction>(raw).unwrap() {
            ClientAction::SendChatMsg { kind, attachments, .. } => {
                assert_eq!(kind, MessageKind::Text);
                assert!(attachments.is_empty());
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_parse_get_rooms_with_empty_data() {
        let raw = json!({ "action": "getChatRooms", "data": {} });
        let action: ClientAction = serde_json::from_value(raw).unwrap();
        assert_eq!(action.name(), "getChatRooms");
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let raw = json!({ "action": "joinRoom", "data": {} });
        assert!(serde_json::from_value::<ClientAction>(raw).is_err());
    }

    #[test]
    fn test_server_event_envelope() {
        let event = ServerEvent::RoomLeft {
            chatroom_id: "r1".into(),
            user_id: "a".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({ "action": "roomLeft", "data": { "chatroomId": "r1", "userId": "a" } }));
        assert_eq!(event.name(), "roomLeft");
    }
}
