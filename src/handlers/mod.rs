pub mod auth;
pub mod chat;
pub mod wallet;
pub mod webhook;
pub mod ws;

use crate::health::HealthResponse;
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use utoipa::OpenApi;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy or degraded", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let online = state.gateway.presence().online_count().await;
    let response = state.health.check(online).await;

    let status_code = if response.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(response))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        wallet::wallet_info,
        wallet::list_gifts,
        wallet::send_gift,
        wallet::deduct,
        wallet::list_transactions,
        wallet::get_transaction,
        wallet::buy_coins,
        webhook::payment_callback,
        webhook::payment_webhook,
        chat::history,
        chat::relationship_event,
    ),
    components(schemas(
        HealthResponse,
        wallet::SendGiftBody,
        wallet::DeductBody,
        wallet::BuyCoinsBody,
        wallet::BuyCoinsResponse,
        webhook::WebhookPayload,
        webhook::ReconcileResponse,
        chat::RelationshipChange,
        chat::RelationshipEventBody,
        crate::utils::pagination::PageMeta,
    )),
    tags(
        (name = "Health", description = "Liveness and dependency status"),
        (name = "Wallet", description = "Balances, gifts, ledger and top-ups"),
        (name = "Payments", description = "Payment provider callbacks"),
        (name = "Chat", description = "Conversation history and relationship events")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
