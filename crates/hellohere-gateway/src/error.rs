use thiserror::Error;

use hellohere_db::StoreError;

/// Everything a chat action can be rejected with. Each variant maps to the
/// HTTP-style status reported back to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("room not active")]
    RoomNotActive,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn status(&self) -> u16 {
        match self {
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) | Self::RoomNotActive => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::BadRequest(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Short reason for the client. Internal details stay in the logs.
    pub fn reason(&self) -> String {
        match self {
            Self::Unauthorized(r)
            | Self::Forbidden(r)
            | Self::NotFound(r)
            | Self::Conflict(r)
            | Self::BadRequest(r) => r.clone(),
            Self::RoomNotActive => "room not active".into(),
            Self::Internal(_) => "internal error".into(),
        }
    }
}

impl From<StoreError> for ChatError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Conflict(what) => Self::Conflict(what),
            StoreError::Backend(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ChatError::Unauthorized("x".into()).status(), 401);
        assert_eq!(ChatError::Forbidden("x".into()).status(), 403);
        assert_eq!(ChatError::RoomNotActive.status(), 403);
        assert_eq!(ChatError::NotFound("x".into()).status(), 404);
        assert_eq!(ChatError::Conflict("x".into()).status(), 409);
        assert_eq!(ChatError::BadRequest("x".into()).status(), 400);
        assert_eq!(ChatError::Internal("x".into()).status(), 500);
    }

    #[test]
    fn test_internal_reason_is_opaque() {
        let err = ChatError::from(StoreError::Backend("disk I/O error".into()));
        assert_eq!(err.reason(), "internal error");
        assert_eq!(ChatError::RoomNotActive.reason(), "room not active");
    }
}
