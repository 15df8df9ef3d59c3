use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::ports::RepositoryError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Recipient user not found")]
    RecipientNotFound,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("You cannot message this user")]
    Blocked,

    #[error("You can only message friends")]
    NotFriends,

    #[error("Messaging is disabled in this chat")]
    MessagingDisabled,

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Failed to create payment link")]
    PaymentLinkUnavailable,

    #[error("Invalid transaction")]
    InvalidOrDuplicateReference,

    #[error("External service unavailable: {0}")]
    ExternalOracleUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            AppError::RecipientNotFound | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidPayload(_)
            | AppError::Validation(_)
            | AppError::InvalidOrDuplicateReference => StatusCode::BAD_REQUEST,
            AppError::Blocked | AppError::NotFriends | AppError::MessagingDisabled => {
                StatusCode::FORBIDDEN
            }
            AppError::InsufficientBalance => StatusCode::PAYMENT_REQUIRED,
            AppError::PaymentLinkUnavailable => StatusCode::BAD_GATEWAY,
            AppError::ExternalOracleUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::DatabaseError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text sent to a chat client in an `error` event. Storage failures are
    /// reported generically so no internals reach the far end.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::DatabaseError(_) | AppError::Internal(_) => {
                "Something went wrong, please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            RepositoryError::Database(e) => AppError::Database(e),
            RepositoryError::Conflict(detail) | RepositoryError::Corrupt(detail) => {
                AppError::DatabaseError(detail)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_status_code() {
        let error = AppError::Validation("Invalid input".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_error_status_code() {
        let error = AppError::NotFound("Resource not found".to_string());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_database_error_status_code() {
        let error = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_send_path_errors_are_client_errors() {
        for error in [
            AppError::RecipientNotFound,
            AppError::InvalidPayload("text".to_string()),
            AppError::Blocked,
            AppError::NotFriends,
            AppError::MessagingDisabled,
            AppError::InsufficientBalance,
        ] {
            assert!(error.status_code().is_client_error(), "{:?}", error);
        }
    }

    #[test]
    fn test_authentication_failed_status_code() {
        assert_eq!(
            AppError::AuthenticationFailed.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_insufficient_balance_status_code() {
        assert_eq!(
            AppError::InsufficientBalance.status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
    }

    #[test]
    fn test_duplicate_reference_status_code() {
        assert_eq!(
            AppError::InvalidOrDuplicateReference.status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_oracle_unavailable_status_code() {
        let error = AppError::ExternalOracleUnavailable("payment gateway".to_string());
        assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_client_message_hides_storage_details() {
        let error = AppError::DatabaseError("relation \"wallets\" does not exist".to_string());
        assert!(!error.client_message().contains("wallets"));
        assert_eq!(AppError::Blocked.client_message(), "You cannot message this user");
    }

    #[test]
    fn test_repository_not_found_maps_to_not_found() {
        let error: AppError = RepositoryError::NotFound("wallet".to_string()).into();
        assert!(matches!(error, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_validation_error_response() {
        let error = AppError::Validation("Invalid email format".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_database_error_response() {
        let error = AppError::Database(sqlx::Error::RowNotFound);
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
