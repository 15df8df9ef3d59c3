use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::ExternalPaymentRefs;
use crate::error::AppError;
use crate::handlers::auth::VerifiedWebhook;
use crate::services::ReconcileOutcome;
use crate::AppState;

/// Query string the payment provider appends when redirecting the buyer back.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub tx_ref: Option<String>,
    pub status: Option<String>,
    pub transaction_id: Option<String>,
    pub reference: Option<String>,
}

/// Asynchronous notification body.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub tx_ref: String,
    pub status: Option<String>,
    #[schema(value_type = Option<String>)]
    pub id: Option<serde_json::Value>,
    pub flw_ref: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReconcileResponse {
    pub message: String,
    pub status: String,
}

impl From<&ReconcileOutcome> for ReconcileResponse {
    fn from(outcome: &ReconcileOutcome) -> Self {
        Self {
            message: outcome.message().to_string(),
            status: outcome.status().to_string(),
        }
    }
}

// Providers send numeric ids; store them as text.
fn id_to_string(id: serde_json::Value) -> Option<String> {
    match id {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[utoipa::path(
    get,
    path = "/wallet/callback",
    params(
        ("tx_ref" = String, Query, description = "Top-up reference"),
        ("status" = Option<String>, Query, description = "Status reported by the provider"),
        ("transaction_id" = Option<String>, Query, description = "Provider transaction id"),
        ("reference" = Option<String>, Query, description = "Provider reference")
    ),
    responses(
        (status = 200, description = "Top-up resolved", body = ReconcileResponse),
        (status = 400, description = "Unknown or already settled reference"),
        (status = 503, description = "Payment provider unreachable")
    ),
    tag = "Payments"
)]
pub async fn payment_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, AppError> {
    let reference = query.tx_ref.unwrap_or_default();
    let refs = ExternalPaymentRefs {
        status: query.status,
        transaction_id: query.transaction_id,
        reference: query.reference,
    };
    tracing::info!(reference = %reference, status = ?refs.status, "Payment callback received");

    let outcome = state.payments.reconcile(&reference, &refs).await?;
    Ok(Json(ReconcileResponse::from(&outcome)))
}

#[utoipa::path(
    post,
    path = "/wallet/webhook",
    request_body = WebhookPayload,
    responses(
        (status = 200, description = "Top-up resolved", body = ReconcileResponse),
        (status = 400, description = "Unknown or already settled reference"),
        (status = 401, description = "Missing or invalid signature")
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    webhook: VerifiedWebhook,
) -> Result<impl IntoResponse, AppError> {
    let payload: WebhookPayload = serde_json::from_slice(&webhook.body)
        .map_err(|e| AppError::Validation(format!("invalid webhook body: {}", e)))?;
    let refs = ExternalPaymentRefs {
        status: payload.status,
        transaction_id: payload.id.and_then(id_to_string),
        reference: payload.flw_ref,
    };
    tracing::info!(reference = %payload.tx_ref, status = ?refs.status, "Payment webhook received");

    let outcome = state.payments.reconcile(&payload.tx_ref, &refs).await?;
    Ok(Json(ReconcileResponse::from(&outcome)))
}
