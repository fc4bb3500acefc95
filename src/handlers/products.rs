use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    auth::AuthUser,
    entities::product::{self, ProductStatus},
    errors::ServiceError,
    services::products::{CreateProductInput, UpdateProductInput},
    ApiResponse, AppState, PaginatedResponse,
};

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: i64,
    pub name: String,
    /// French name, falling back to the canonical one when not translated
    pub name_fr: String,
    pub description: Option<String>,
    pub description_fr: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&product::Model> for ProductResponse {
    fn from(model: &product::Model) -> Self {
        Self {
            id: model.id,
            name: model.name.clone(),
            name_fr: model
                .name_fr
                .clone()
                .unwrap_or_else(|| model.name.clone()),
            description: model.description.clone(),
            description_fr: model
                .description_fr
                .clone()
                .or_else(|| model.description.clone()),
            price: model.price,
            stock: model.stock,
            status: model.status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Restrict to active products
    #[serde(default)]
    pub active: bool,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

/// GET /api/products
pub async fn list_products(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<ProductResponse>>>, ServiceError> {
    let (products, total) = state
        .services
        .products
        .list_products(query.page, query.limit, query.active)
        .await?;

    let items: Vec<ProductResponse> = products.iter().map(ProductResponse::from).collect();
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items,
        total,
        query.page,
        query.limit,
    ))))
}

/// GET /api/products/:id
pub async fn get_product(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    let product = state
        .services
        .products
        .get_product(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;

    Ok(Json(ApiResponse::success(ProductResponse::from(&product))))
}

/// POST /api/products
pub async fn create_product(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateProductInput>,
) -> Result<(StatusCode, Json<ApiResponse<ProductResponse>>), ServiceError> {
    if !auth_user.is_admin() {
        return Err(ServiceError::Forbidden(
            "only administrators can manage the catalog".to_string(),
        ));
    }

    let product = state
        .services
        .products
        .create_product(request, &auth_user.actor())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(ProductResponse::from(&product))),
    ))
}

/// PUT /api/products/:id
pub async fn update_product(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdateProductInput>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    if !auth_user.is_admin() {
        return Err(ServiceError::Forbidden(
            "only administrators can manage the catalog".to_string(),
        ));
    }

    let product = state
        .services
        .products
        .update_product(id, request, &auth_user.actor())
        .await?;

    Ok(Json(ApiResponse::success(ProductResponse::from(&product))))
}

/// DELETE /api/products/:id (soft retire, the row survives)
pub async fn retire_product(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    if !auth_user.is_admin() {
        return Err(ServiceError::Forbidden(
            "only administrators can manage the catalog".to_string(),
        ));
    }

    let product = state
        .services
        .products
        .retire_product(id, &auth_user.actor())
        .await?;

    Ok(Json(ApiResponse::success(ProductResponse::from(&product))))
}
