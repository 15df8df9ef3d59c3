use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::services::RelationshipEvent;
use crate::utils::pagination::PaginationParams;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipChange {
    Befriended,
    Unfriended,
    Blocked,
    Unblocked,
}

/// A relationship change made by the caller towards `user_id`, forwarded
/// once the friends service has applied it.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipEventBody {
    pub event: RelationshipChange,
    pub user_id: Uuid,
}

impl RelationshipEventBody {
    fn into_event(self, actor: Uuid) -> RelationshipEvent {
        let other = self.user_id;
        match self.event {
            RelationshipChange::Befriended => RelationshipEvent::Befriended { a: actor, b: other },
            RelationshipChange::Unfriended => RelationshipEvent::Unfriended { a: actor, b: other },
            RelationshipChange::Blocked => RelationshipEvent::Blocked {
                blocker: actor,
                blocked: other,
            },
            RelationshipChange::Unblocked => RelationshipEvent::Unblocked {
                blocker: actor,
                blocked: other,
            },
        }
    }
}

#[utoipa::path(
    get,
    path = "/chats/{user_id}/messages",
    params(
        ("user_id" = Uuid, Path, description = "The other participant"),
        ("page" = Option<i64>, Query, description = "Page number, from 1"),
        ("limit" = Option<i64>, Query, description = "Items per page, at most 100")
    ),
    responses((status = 200, description = "Messages, oldest first")),
    tag = "Chat"
)]
pub async fn history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(other): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, AppError> {
    let messages = state.gateway.history(&user, other, params.page()).await?;
    Ok(Json(json!({ "data": messages })))
}

#[utoipa::path(
    post,
    path = "/chats/relationship-events",
    request_body = RelationshipEventBody,
    responses((status = 200, description = "Conversation flag re-evaluated")),
    tag = "Chat"
)]
pub async fn relationship_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<RelationshipEventBody>,
) -> Result<impl IntoResponse, AppError> {
    if body.user_id == user.id {
        return Err(AppError::Validation("userId must be another user".to_string()));
    }
    let conversation = state.conversations.apply(body.into_event(user.id)).await?;
    Ok(Json(json!({
        "data": conversation.map(|c| json!({
            "id": c.id,
            "messagingEnabled": c.messaging_enabled,
        })),
    })))
}
