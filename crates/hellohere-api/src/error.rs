use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use hellohere_gateway::ChatError;
use hellohere_types::api::ErrorBody;

/// A [`ChatError`] rendered as `{status, reason}` with the matching HTTP status.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub ChatError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ChatError::Internal(detail) = &self.0 {
            error!("Request failed: {}", detail);
        }
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            status: status.as_u16(),
            reason: self.0.reason(),
        };
        (status, Json(body)).into_response()
    }
}
