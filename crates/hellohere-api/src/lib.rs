pub mod error;
pub mod messages;
pub mod middleware;
pub mod rooms;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use hellohere_gateway::ChatService;
use hellohere_gateway::auth::TokenVerifier;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub chat: Arc<ChatService>,
    pub verifier: Arc<dyn TokenVerifier>,
}

/// Authenticated REST routes over the chat core.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat/rooms", get(rooms::list_rooms).post(rooms::create_room))
        .route("/chat/rooms/{room_id}/read", post(messages::mark_read))
        .route("/chat/rooms/{room_id}/unread", get(messages::read_state))
        .route("/chat/message", post(messages::send_message))
        .route("/chat/history/{room_id}", get(messages::get_history))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state)
}
