use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use hellohere_gateway::Actor;
use hellohere_gateway::chat::Outgoing;
use hellohere_types::api::{
    HistoryResponse, MarkReadRequest, ReadStateResponse, SendMessageRequest, SendMessageResponse,
};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Server default and cap apply when absent or too large.
    pub limit: Option<u32>,
    /// Timestamp cursor: only messages strictly older are returned.
    pub before: Option<i64>,
}

/// Send as the authenticated user. Same room checks and fan-out as the
/// WebSocket `sendChatMsg`; the reply reports the safety verdict.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outgoing = Outgoing {
        body: req.message,
        kind: req.kind,
        attachments: req.attachments,
    };
    let sent = state
        .chat
        .send_screened(&actor, &actor.user_id, &req.chatroom_id, outgoing)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            message_id: sent.message.message_id,
            original_message: sent.original,
            filtered_message: sent.verdict.filtered_message,
            is_safe: sent.verdict.is_safe,
            risk_level: sent.verdict.risk_level.as_str().to_string(),
        }),
    ))
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<HistoryQuery>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state
        .chat
        .history(&actor, &room_id, query.limit, query.before)
        .await?;
    Ok(Json(HistoryResponse {
        chatroom_id: room_id,
        messages,
    }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let read = state.chat.mark_read(&actor, &room_id, req.upto).await?;
    Ok(Json(ReadStateResponse {
        chatroom_id: room_id,
        last_read_timestamp: read.last_read,
        unread_count: read.unread,
    }))
}

pub async fn read_state(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    let read = state.chat.read_state(&actor, &room_id).await?;
    Ok(Json(ReadStateResponse {
        chatroom_id: room_id,
        last_read_timestamp: read.last_read,
        unread_count: read.unread,
    }))
}
