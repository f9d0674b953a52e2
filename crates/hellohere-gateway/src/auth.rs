use jsonwebtoken::{DecodingKey, Validation, decode};
use thiserror::Error;
use tracing::debug;

use hellohere_types::api::Claims;

/// Who a bearer token says the caller is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub nickname: Option<String>,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            nickname: claims.nickname,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no token provided")]
    Missing,

    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Turns a bearer token into an [`Identity`]. Issuing tokens happens elsewhere.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// HS256 verifier sharing its secret with the token issuer.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Missing);
        }

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            debug!("Token rejected: {}", e);
            AuthError::Invalid(e.to_string())
        })?;

        if data.claims.user_id.is_empty() {
            return Err(AuthError::Invalid("token carries no user id".into()));
        }

        Ok(data.claims.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    fn token(secret: &str, body: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &body,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn test_accepts_user_id_claim() {
        let verifier = JwtVerifier::new("s3cret");
        let t = token("s3cret", json!({ "userId": "u1", "nickname": "Ann", "exp": far_future() }));
        let id = verifier.verify(&t).unwrap();
        assert_eq!(id.user_id, "u1");
        assert_eq!(id.nickname.as_deref(), Some("Ann"));
    }

    #[test]
    fn test_accepts_legacy_id_claim() {
        let verifier = JwtVerifier::new("s3cret");
        let t = token("s3cret", json!({ "id": "u2", "exp": far_future() }));
        assert_eq!(verifier.verify(&t).unwrap().user_id, "u2");
    }

    #[test]
    fn test_rejects_wrong_secret_and_empty() {
        let verifier = JwtVerifier::new("s3cret");
        let t = token("other", json!({ "userId": "u1", "exp": far_future() }));
        assert!(matches!(verifier.verify(&t), Err(AuthError::Invalid(_))));
        assert_eq!(verifier.verify(""), Err(AuthError::Missing));
    }
}
