#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use sha2::Sha256;
use storefront_api::{
    auth::{hash_password, AuthConfig, AuthService},
    chat::CommandInterpreter,
    config::AppConfig,
    db,
    entities::user::{self, UserRole},
    errors::ServiceError,
    events::{self, EventSender},
    messaging::{MessagingGateway, ReplyButton},
    services::products::CreateProductInput,
    services::AppServices,
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_VERIFY_TOKEN: &str = "verify-token-tests";
pub const TEST_WEBHOOK_SECRET: &str = "test_webhook_secret_0123456789";

/// In-memory stand-in for the messaging provider. Records every outbound
/// call and hands back deterministic provider message ids.
#[derive(Default)]
pub struct RecordingGateway {
    pub sent: Mutex<Vec<(String, String)>>,
    pub read_receipts: Mutex<Vec<String>>,
}

impl RecordingGateway {
    fn next_id(&self) -> String {
        format!("wamid.test.{}", self.sent.lock().unwrap().len() + 1)
    }

    pub fn sent_bodies(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send_text(&self, to: &str, body: &str) -> Result<String, ServiceError> {
        let id = self.next_id();
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(id)
    }

    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        _buttons: &[ReplyButton],
    ) -> Result<String, ServiceError> {
        let id = self.next_id();
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(id)
    }

    async fn mark_read(&self, provider_message_id: &str) -> Result<(), ServiceError> {
        self.read_receipts
            .lock()
            .unwrap()
            .push(provider_message_id.to_string());
        Ok(())
    }
}

/// Helper harness spinning up the full application state over a file-backed
/// SQLite database, with one admin and one staff account ready to use.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<RecordingGateway>,
    admin_token: String,
    staff_token: String,
    pub admin_id: Uuid,
    pub staff_id: Uuid,
    _db_dir: tempfile::TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir for sqlite");
        let db_path = db_dir.path().join("storefront_test.db");

        let cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            TEST_VERIFY_TOKEN.to_string(),
            TEST_WEBHOOK_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth_service = Arc::new(AuthService::new(
            AuthConfig::new(cfg.jwt_secret.clone(), Duration::from_secs(3600)),
            db_arc.clone(),
        ));

        let services = AppServices::new(
            db_arc.clone(),
            event_sender.clone(),
            auth_service.clone(),
            "EUR".to_string(),
        );

        let gateway = Arc::new(RecordingGateway::default());
        let interpreter = Arc::new(CommandInterpreter::new(
            services.clone(),
            gateway.clone(),
            "EUR".to_string(),
            10,
            5,
        ));

        let state = AppState {
            db: db_arc.clone(),
            config: cfg,
            event_sender,
            services,
            gateway: gateway.clone(),
            interpreter,
        };

        let (admin_id, admin_token) =
            seed_user(&state, &auth_service, "admin@test.local", UserRole::Admin).await;
        let (staff_id, staff_token) =
            seed_user(&state, &auth_service, "staff@test.local", UserRole::Staff).await;

        let router = storefront_api::app_router(state.clone());

        Self {
            router,
            state,
            gateway,
            admin_token,
            staff_token,
            admin_id,
            staff_id,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    pub fn staff_token(&self) -> &str {
        &self.staff_token
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Provider-style delivery: raw JSON body signed with the webhook secret.
    pub async fn signed_webhook_post(&self, body: &[u8], secret: &str) -> axum::response::Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/webhook")
            .header("content-type", "application/json")
            .header("x-hub-signature-256", format!("sha256={}", sign(body, secret)))
            .body(Body::from(body.to_vec()))
            .expect("failed to build webhook request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during webhook request")
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> i64 {
        self.state
            .services
            .products
            .create_product(
                CreateProductInput {
                    name: name.to_string(),
                    name_fr: None,
                    description: None,
                    description_fr: None,
                    price,
                    stock,
                },
                "user:test-seed",
            )
            .await
            .expect("seed product for tests")
            .id
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn sign(body: &[u8], secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

async fn seed_user(
    state: &AppState,
    auth_service: &AuthService,
    email: &str,
    role: UserRole,
) -> (Uuid, String) {
    let now = Utc::now();
    let model = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        name: Set(email.to_string()),
        password_hash: Set(hash_password("correct horse battery staple").expect("hash")),
        role: Set(role),
        active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*state.db)
    .await
    .expect("seed user");

    let token = auth_service
        .generate_token(&model)
        .expect("token for seeded user");
    (model.id, token.access_token)
}

/// Reads a JSON body out of a response, asserting the expected status first.
pub async fn json_body(response: axum::response::Response, expected: StatusCode) -> Value {
    assert_eq!(response.status(), expected, "unexpected response status");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}
