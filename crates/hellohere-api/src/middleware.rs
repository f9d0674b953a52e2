use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use hellohere_gateway::{Actor, ChatError};

use crate::AppState;
use crate::error::ApiError;

/// Extract and validate the bearer token, then expose the caller as an
/// [`Actor`] extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ChatError::Unauthorized("no token provided".into()))?;

    let identity = state
        .verifier
        .verify(token)
        .map_err(|_| ChatError::Unauthorized("invalid token".into()))?;

    req.extensions_mut()
        .insert(Actor::user(identity.user_id, identity.nickname));
    Ok(next.run(req).await)
}
