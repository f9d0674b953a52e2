use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use hellohere_gateway::Actor;
use hellohere_types::api::{CreateRoomRequest, RoomListResponse};

use crate::AppState;
use crate::error::ApiError;

pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    let rooms = state.chat.list_rooms(&actor).await?;
    Ok(Json(RoomListResponse { rooms }))
}

/// Legacy direct creation. Returns 201 for a new room, 200 if the pair
/// already had one open.
pub async fn create_room(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (room, created) = state
        .chat
        .create_room(&actor, &actor.user_id, &req.target_user_id, req.title.as_deref())
        .await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(room)))
}
