use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::UserProfile;
use crate::error::AppError;
use crate::ports::{TokenError, TokenVerifier};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// HS256 verifier for access tokens minted by the auth service.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Uuid, TokenError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("Expired token"),
                _ => tracing::debug!(error = %e, "Invalid token"),
            }
            TokenError::Rejected
        })?;

        Uuid::parse_str(&data.claims.sub).map_err(|_| TokenError::InvalidSubject)
    }
}

/// Pulls the credential out of an `Authorization: Bearer <token>` value.
pub fn extract_bearer(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// The authenticated caller, resolved from the bearer token.
pub struct AuthUser(pub UserProfile);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let user = state.gateway.authenticate(header).await?;
        Ok(AuthUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token(sub: &str, exp_offset: i64, secret: &str) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset) as usize;
        let claims = Claims {
            sub: sub.to_string(),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer("Bearer "), None);
        assert_eq!(extract_bearer("Basic abc"), None);
        assert_eq!(extract_bearer("abc"), None);
    }

    #[tokio::test]
    async fn test_valid_token_yields_subject() {
        let user = Uuid::new_v4();
        let verifier = JwtVerifier::new(SECRET);
        let result = verifier.verify(&token(&user.to_string(), 3600, SECRET)).await;
        assert_eq!(result, Ok(user));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let verifier = JwtVerifier::new(SECRET);
        let result = verifier
            .verify(&token(&Uuid::new_v4().to_string(), -3600, SECRET))
            .await;
        assert_eq!(result, Err(TokenError::Rejected));
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let verifier = JwtVerifier::new(SECRET);
        let result = verifier
            .verify(&token(&Uuid::new_v4().to_string(), 3600, "other"))
            .await;
        assert_eq!(result, Err(TokenError::Rejected));
    }

    #[tokio::test]
    async fn test_non_uuid_subject_rejected() {
        let verifier = JwtVerifier::new(SECRET);
        let result = verifier.verify(&token("alice", 3600, SECRET)).await;
        assert_eq!(result, Err(TokenError::InvalidSubject));
    }
}
