use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser, entities::customer, errors::ServiceError, ApiResponse, AppState, ListQuery,
    PaginatedResponse,
};

/// GET /api/customers
pub async fn list_customers(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<customer::Model>>>, ServiceError> {
    if !auth_user.is_admin() {
        return Err(ServiceError::Forbidden(
            "only administrators can browse customers".to_string(),
        ));
    }

    let (customers, total) = state
        .services
        .customers
        .list_customers(query.page, query.limit)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        customers,
        total,
        query.page,
        query.limit,
    ))))
}

/// GET /api/customers/:id
pub async fn get_customer(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<customer::Model>>, ServiceError> {
    if !auth_user.is_admin() {
        return Err(ServiceError::Forbidden(
            "only administrators can browse customers".to_string(),
        ));
    }

    let customer = state
        .services
        .customers
        .get_customer(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", id)))?;

    Ok(Json(ApiResponse::success(customer)))
}
