use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::order::{self, OrderStatus, PaymentStatus},
    entities::order_item,
    entities::order_status_history,
    errors::ServiceError,
    handlers::source_ip,
    services::orders::{
        CreateOrderInput, OrderDetails, OrderFilter, OrderItemInput, OrderOrigin, StatusSummary,
    },
    ApiResponse, AppState, PaginatedResponse,
};

// Order DTOs

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// When set, the order is placed on behalf of this customer;
    /// otherwise it belongs to the calling user.
    pub phone_number: Option<String>,
    pub items: Vec<CreateOrderItem>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderItem {
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub status: Option<OrderStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total_amount: Decimal,
    pub currency: String,
    pub customer_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub notes: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub history: Vec<TransitionResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor: String,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

fn map_item(model: &order_item::Model) -> OrderItemResponse {
    OrderItemResponse {
        product_id: model.product_id,
        product_name: model.product_name.clone(),
        quantity: model.quantity,
        unit_price: model.unit_price,
        line_total: model.line_total(),
    }
}

fn map_transition(model: &order_status_history::Model) -> TransitionResponse {
    TransitionResponse {
        from: model.from_status,
        to: model.to_status,
        actor: model.actor.clone(),
        note: model.note.clone(),
        at: model.created_at,
    }
}

fn map_order(model: &order::Model) -> OrderResponse {
    OrderResponse {
        order_number: model.order_number.clone(),
        status: model.status,
        payment_status: model.payment_status,
        total_amount: model.total_amount,
        currency: model.currency.clone(),
        customer_id: model.customer_id,
        user_id: model.user_id,
        notes: model.notes.clone(),
        items: Vec::new(),
        history: Vec::new(),
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

fn map_details(details: &OrderDetails) -> OrderResponse {
    let mut response = map_order(&details.order);
    response.items = details.items.iter().map(map_item).collect();
    response.history = details.history.iter().map(map_transition).collect();
    response
}

/// POST /api/orders
pub async fn create_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    headers: HeaderMap,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    if request.items.is_empty() {
        return Err(ServiceError::ValidationError(
            "an order needs at least one item".to_string(),
        ));
    }

    let origin = match &request.phone_number {
        Some(phone) if !phone.trim().is_empty() => {
            let customer = state
                .services
                .customers
                .find_or_create(phone.trim(), None)
                .await?;
            OrderOrigin::Customer(customer.id)
        }
        _ => OrderOrigin::User(auth_user.user_id),
    };

    let details = state
        .services
        .orders
        .create_order(CreateOrderInput {
            origin,
            items: request
                .items
                .iter()
                .map(|i| OrderItemInput {
                    product_id: i.product_id,
                    quantity: i.quantity,
                })
                .collect(),
            note: request.note,
            source_ip: source_ip(&headers),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(map_details(&details))),
    ))
}

/// GET /api/orders
pub async fn list_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderResponse>>>, ServiceError> {
    // Non-admin callers only ever see their own orders.
    let user_id = if auth_user.is_admin() {
        None
    } else {
        Some(auth_user.user_id)
    };

    let (orders, total) = state
        .services
        .orders
        .list_orders(OrderFilter {
            page: query.page,
            limit: query.limit,
            status: query.status,
            customer_id: None,
            user_id,
            start_date: query.start_date,
            end_date: query.end_date,
        })
        .await?;

    let items: Vec<OrderResponse> = orders.iter().map(map_order).collect();
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items,
        total,
        query.page,
        query.limit,
    ))))
}

/// GET /api/orders/:order_number
pub async fn get_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(order_number): Path<String>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let details = state
        .services
        .orders
        .get_order(&order_number)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))?;

    // Not owned reads as not found, so order numbers cannot be probed.
    if !auth_user.is_admin() && details.order.user_id != Some(auth_user.user_id) {
        return Err(ServiceError::NotFound(format!(
            "Order {} not found",
            order_number
        )));
    }

    Ok(Json(ApiResponse::success(map_details(&details))))
}

/// PATCH /api/orders/:order_number/status
pub async fn update_order_status(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(order_number): Path<String>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    if !auth_user.is_admin() {
        return Err(ServiceError::Forbidden(
            "only administrators can change order status".to_string(),
        ));
    }

    state
        .services
        .orders
        .update_status(
            &order_number,
            request.status,
            &auth_user.actor(),
            request.note,
        )
        .await?;

    // Re-read with items and the freshly appended history entry.
    let details = state
        .services
        .orders
        .get_order(&order_number)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))?;

    Ok(Json(ApiResponse::success(map_details(&details))))
}

/// GET /api/orders/stats/summary
pub async fn order_stats(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<StatusSummary>>>, ServiceError> {
    if !auth_user.is_admin() {
        return Err(ServiceError::Forbidden(
            "only administrators can read order statistics".to_string(),
        ));
    }

    let stats = state.services.orders.order_stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}
