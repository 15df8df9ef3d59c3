use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::utils::pagination::PaginationParams;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendGiftBody {
    pub gift_id: Uuid,
    pub receiver_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeductBody {
    #[schema(value_type = String, example = "2.5")]
    pub amount: BigDecimal,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BuyCoinsBody {
    #[schema(value_type = String, example = "50")]
    pub amount: BigDecimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BuyCoinsResponse {
    pub message: String,
    pub link: String,
}

#[utoipa::path(
    get,
    path = "/wallet",
    responses(
        (status = 200, description = "Wallet balance"),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    tag = "Wallet"
)]
pub async fn wallet_info(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let wallet = state.wallet.wallet(&user).await?;
    Ok(Json(json!({
        "message": "Wallet information retrieved successfully",
        "data": {
            "balance": wallet.balance,
            "updated_at": wallet.updated_at,
        }
    })))
}

#[utoipa::path(
    get,
    path = "/wallet/gifts",
    params(
        ("page" = Option<i64>, Query, description = "Page number, from 1"),
        ("limit" = Option<i64>, Query, description = "Items per page, at most 100")
    ),
    responses((status = 200, description = "Gift catalogue page")),
    tag = "Wallet"
)]
pub async fn list_gifts(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.wallet.gifts(params.page()).await?))
}

#[utoipa::path(
    post,
    path = "/wallet/gifts/send",
    request_body = SendGiftBody,
    responses(
        (status = 200, description = "Gift sent"),
        (status = 402, description = "Insufficient balance"),
        (status = 404, description = "Unknown gift or receiver")
    ),
    tag = "Wallet"
)]
pub async fn send_gift(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<SendGiftBody>,
) -> Result<impl IntoResponse, AppError> {
    let wallet = state
        .wallet
        .send_gift(&user, body.gift_id, body.receiver_id)
        .await?;
    Ok(Json(json!({
        "message": "Gift sent successfully",
        "data": { "balance": wallet.balance },
    })))
}

#[utoipa::path(
    post,
    path = "/wallet/deduct",
    request_body = DeductBody,
    responses(
        (status = 200, description = "Coins deducted"),
        (status = 402, description = "Insufficient balance")
    ),
    tag = "Wallet"
)]
pub async fn deduct(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<DeductBody>,
) -> Result<impl IntoResponse, AppError> {
    let wallet = state.wallet.deduct(&user, body.amount, body.description).await?;
    Ok(Json(json!({
        "message": "Coins deducted successfully",
        "data": { "balance": wallet.balance },
    })))
}

#[utoipa::path(
    get,
    path = "/wallet/transactions",
    params(
        ("page" = Option<i64>, Query, description = "Page number, from 1"),
        ("limit" = Option<i64>, Query, description = "Items per page, at most 100")
    ),
    responses((status = 200, description = "Caller's ledger, newest first")),
    tag = "Wallet"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.wallet.transactions(&user, params.page()).await?))
}

#[utoipa::path(
    get,
    path = "/wallet/transactions/{id}",
    params(("id" = String, Path, description = "Ledger entry id")),
    responses(
        (status = 200, description = "Ledger entry"),
        (status = 404, description = "No such entry for this user")
    ),
    tag = "Wallet"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.wallet.transaction(&user, &id).await?))
}

#[utoipa::path(
    post,
    path = "/wallet/buy-coins",
    request_body = BuyCoinsBody,
    responses(
        (status = 200, description = "Hosted payment link", body = BuyCoinsResponse),
        (status = 400, description = "Amount out of range"),
        (status = 502, description = "Payment provider returned no link")
    ),
    tag = "Wallet"
)]
pub async fn buy_coins(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<BuyCoinsBody>,
) -> Result<impl IntoResponse, AppError> {
    let top_up = state.payments.request_top_up(&user, body.amount).await?;
    Ok(Json(BuyCoinsResponse {
        message: "Payment link created successfully".to_string(),
        link: top_up.link,
    }))
}
