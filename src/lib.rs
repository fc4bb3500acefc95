//! storefront-api library
//!
//! Chat-commerce backend: catalog, orders and inventory behind a REST API,
//! bridged to a WhatsApp-style messaging provider through a signed webhook.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod messaging;
pub mod migrator;
pub mod services;
pub mod webhook;

use std::sync::Arc;

use axum::{
    extract::State,
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::chat::CommandInterpreter;
use crate::messaging::MessagingGateway;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: services::AppServices,
    pub gateway: Arc<dyn MessagingGateway>,
    pub interpreter: Arc<CommandInterpreter>,
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

// Common response wrappers
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let limit = limit.max(1);
        Self {
            items,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Builds the full application router: public surface (status, login,
/// webhook) plus the bearer-authenticated API.
pub fn app_router(state: AppState) -> Router {
    let protected = Router::new()
        // Orders
        .route(
            "/orders",
            post(handlers::orders::create_order).get(handlers::orders::list_orders),
        )
        .route("/orders/stats/summary", get(handlers::orders::order_stats))
        .route("/orders/:order_number", get(handlers::orders::get_order))
        .route(
            "/orders/:order_number/status",
            patch(handlers::orders::update_order_status),
        )
        // Catalog
        .route(
            "/products",
            get(handlers::products::list_products).post(handlers::products::create_product),
        )
        .route(
            "/products/:id",
            get(handlers::products::get_product)
                .put(handlers::products::update_product)
                .delete(handlers::products::retire_product),
        )
        // Customers & conversation history
        .route("/customers", get(handlers::customers::list_customers))
        .route("/customers/:id", get(handlers::customers::get_customer))
        .route("/messages", get(handlers::messages::list_messages))
        // Session introspection
        .route("/auth/me", get(auth::me_handler))
        .layer(middleware::from_fn_with_state(
            state.services.auth.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/", get(|| async { "storefront-api up" }))
        .route("/health", get(health_check))
        .route("/api/status", get(api_status))
        .route("/api/auth/login", post(auth::login_handler))
        // Provider-facing, signature-verified instead of bearer-authenticated
        .route(
            "/webhook",
            get(webhook::verify_webhook).post(webhook::receive_webhook),
        )
        .nest("/api", protected)
        .with_state(state)
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let status_data = json!({
        "status": "ok",
        "service": "storefront-api",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": { "database": db_status },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[test]
    fn paginated_response_rounds_total_pages_up() {
        let page = PaginatedResponse::new(vec![1, 2, 3], 41, 1, 20);
        assert_eq!(page.total_pages, 3);

        let exact = PaginatedResponse::new(vec![1], 40, 1, 20);
        assert_eq!(exact.total_pages, 2);

        let empty = PaginatedResponse::<i32>::new(vec![], 0, 1, 20);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn zero_limit_does_not_divide_by_zero() {
        let page = PaginatedResponse::new(vec![1], 5, 1, 0);
        assert_eq!(page.limit, 1);
        assert_eq!(page.total_pages, 5);
    }
}
