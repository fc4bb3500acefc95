use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::AuthUser, entities::message, errors::ServiceError, ApiResponse, AppState,
    PaginatedResponse,
};

#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub customer_id: Option<Uuid>,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

/// GET /api/messages: conversation history, newest first
pub async fn list_messages(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<message::Model>>>, ServiceError> {
    if !auth_user.is_admin() {
        return Err(ServiceError::Forbidden(
            "only administrators can browse messages".to_string(),
        ));
    }

    let (messages, total) = state
        .services
        .messages
        .list_messages(query.customer_id, query.page, query.limit)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        messages,
        total,
        query.page,
        query.limit,
    ))))
}
