use async_trait::async_trait;
use axum::{
    body::{Bytes, HttpBody},
    extract::FromRequest,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    BoxError, Json,
};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Payment-Signature";

/// Extractor that verifies the X-Payment-Signature header
/// against the request body using HMAC-SHA256
pub struct VerifiedWebhook {
    pub body: Vec<u8>,
}

impl VerifiedWebhook {
    /// Verify the signature using constant-time comparison
    pub fn verify_signature(
        secret: &str,
        body: &[u8],
        signature_header: &str,
    ) -> Result<(), WebhookAuthError> {
        let expected_signature = hex::decode(signature_header.trim())
            .map_err(|_| WebhookAuthError::InvalidSignatureFormat)?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| WebhookAuthError::InvalidSecret)?;
        mac.update(body);

        mac.verify_slice(&expected_signature)
            .map_err(|_| WebhookAuthError::SignatureMismatch)?;

        Ok(())
    }

    /// Hex-encoded signature for `body`, as the payment provider computes it.
    pub fn sign(secret: &str, body: &[u8]) -> Result<String, WebhookAuthError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| WebhookAuthError::InvalidSecret)?;
        mac.update(body);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl<B> FromRequest<AppState, B> for VerifiedWebhook
where
    B: HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Rejection = WebhookAuthError;

    async fn from_request(req: Request<B>, state: &AppState) -> Result<Self, Self::Rejection> {
        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(WebhookAuthError::MissingSignature)?;

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|_| WebhookAuthError::BodyReadError)?;

        Self::verify_signature(&state.webhook_secret, &body, &signature)?;

        Ok(VerifiedWebhook { body: body.to_vec() })
    }
}

#[derive(Debug)]
pub enum WebhookAuthError {
    MissingSignature,
    InvalidSignatureFormat,
    InvalidSecret,
    SignatureMismatch,
    BodyReadError,
}

impl IntoResponse for WebhookAuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            WebhookAuthError::MissingSignature => {
                (StatusCode::UNAUTHORIZED, "Missing X-Payment-Signature header")
            }
            WebhookAuthError::InvalidSignatureFormat => {
                (StatusCode::UNAUTHORIZED, "Invalid signature format")
            }
            WebhookAuthError::InvalidSecret => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Invalid webhook secret configuration")
            }
            WebhookAuthError::SignatureMismatch => {
                (StatusCode::UNAUTHORIZED, "Signature verification failed")
            }
            WebhookAuthError::BodyReadError => {
                (StatusCode::BAD_REQUEST, "Failed to read request body")
            }
        };

        tracing::warn!("Webhook authentication failed: {:?}", self);
        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"txRef":"tx-1"}"#;
        let signature = VerifiedWebhook::sign("secret", body).unwrap();
        assert!(VerifiedWebhook::verify_signature("secret", body, &signature).is_ok());
    }

    #[test]
    fn test_signature_rejects_tampered_body() {
        let signature = VerifiedWebhook::sign("secret", b"original").unwrap();
        assert!(matches!(
            VerifiedWebhook::verify_signature("secret", b"tampered", &signature),
            Err(WebhookAuthError::SignatureMismatch)
        ));
    }

    #[tokio::test]
    async fn test_rejection_body_matches_api_errors() {
        let response = WebhookAuthError::MissingSignature.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], 401);
        assert_eq!(body["error"], "Missing X-Payment-Signature header");
    }

    #[test]
    fn test_signature_rejects_non_hex() {
        assert!(matches!(
            VerifiedWebhook::verify_signature("secret", b"body", "not-hex!"),
            Err(WebhookAuthError::InvalidSignatureFormat)
        ));
    }
}
