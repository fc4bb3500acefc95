use std::sync::Arc;
use std::time::Duration;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
    Json,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    entities::user::{self, UserRole},
    errors::ServiceError,
    services::audit,
};

const TOKEN_ISSUER: &str = "storefront-auth";
const TOKEN_AUDIENCE: &str = "storefront-api";

/// JWT claims carried by every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: UserRole,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Authentication configuration
#[derive(Clone)]
pub struct AuthConfig {
    jwt_secret: String,
    token_ttl: Duration,
}

impl AuthConfig {
    pub fn new(jwt_secret: String, token_ttl: Duration) -> Self {
        Self {
            jwt_secret,
            token_ttl,
        }
    }
}

/// The authenticated caller, extracted from request extensions after
/// [`auth_middleware`] has validated the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn actor(&self) -> String {
        format!("user:{}", self.user_id)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ServiceError::Unauthorized("authentication required".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Issues and validates access tokens against the users table.
pub struct AuthService {
    config: AuthConfig,
    db: Arc<DatabaseConnection>,
}

impl AuthService {
    pub fn new(config: AuthConfig, db: Arc<DatabaseConnection>) -> Self {
        Self { config, db }
    }

    /// Validates credentials and returns a fresh token pair. Both outcomes
    /// leave an audit entry.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        source_ip: Option<String>,
    ) -> Result<TokenResponse, ServiceError> {
        let user = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .filter(user::Column::Active.eq(true))
            .one(&*self.db)
            .await?;

        let Some(user) = user.filter(|u| verify_password(password, &u.password_hash)) else {
            warn!(email, "login rejected");
            audit::record(
                &*self.db,
                audit::AuditEntry::new(email, "auth.login_failed", "user", email)
                    .with_source_ip(source_ip),
            )
            .await?;
            return Err(ServiceError::Unauthorized(
                "invalid email or password".to_string(),
            ));
        };

        audit::record(
            &*self.db,
            audit::AuditEntry::new(
                format!("user:{}", user.id),
                "auth.login",
                "user",
                user.id.to_string(),
            )
            .with_source_ip(source_ip),
        )
        .await?;

        info!(user_id = %user.id, "login succeeded");
        self.generate_token(&user)
    }

    pub fn generate_token(&self, user: &user::Model) -> Result<TokenResponse, ServiceError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::seconds(self.config.token_ttl.as_secs() as i64))
                .timestamp(),
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| ServiceError::InternalError(format!("token encoding failed: {}", e)))?;

        Ok(TokenResponse {
            access_token: token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.token_ttl.as_secs(),
        })
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_audience(&[TOKEN_AUDIENCE]);

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|_| ServiceError::Unauthorized("invalid or expired token".to_string()))?;

        Ok(data.claims)
    }
}

pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ServiceError::InternalError(format!("password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Creates the configured admin account when the users table is empty, so a
/// fresh deployment can log in at all.
pub async fn ensure_bootstrap_admin(
    db: &DatabaseConnection,
    cfg: &AppConfig,
) -> Result<(), ServiceError> {
    let (Some(email), Some(password)) = (cfg.admin_email.as_ref(), cfg.admin_password.as_ref())
    else {
        return Ok(());
    };

    use sea_orm::PaginatorTrait;
    if user::Entity::find().count(db).await? > 0 {
        return Ok(());
    }

    let now = Utc::now();
    user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.clone()),
        name: Set("Administrator".to_string()),
        password_hash: Set(hash_password(password)?),
        role: Set(UserRole::Admin),
        active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;

    info!(email, "bootstrap admin account created");
    Ok(())
}

/// Validates the bearer token and stashes the caller into request extensions.
pub async fn auth_middleware(
    State(auth_service): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))?;

    let claims = auth_service.validate_token(token)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ServiceError::Unauthorized("malformed token subject".to_string()))?;

    request.extensions_mut().insert(AuthUser {
        user_id,
        email: claims.email,
        role: claims.role,
    });

    Ok(next.run(request).await)
}

/// POST /api/auth/login
pub async fn login_handler(
    State(state): State<crate::AppState>,
    headers: axum::http::HeaderMap,
    Json(credentials): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ServiceError> {
    if credentials.email.trim().is_empty() || credentials.password.is_empty() {
        return Err(ServiceError::ValidationError(
            "email and password are required".to_string(),
        ));
    }

    let source_ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string());

    let token = state
        .services
        .auth
        .authenticate(&credentials.email, &credentials.password, source_ip)
        .await?;

    Ok(Json(token))
}

/// GET /api/auth/me, identity echo for dashboard session checks.
pub async fn me_handler(auth_user: AuthUser) -> Json<serde_json::Value> {
    Json(json!({
        "user_id": auth_user.user_id,
        "email": auth_user.email,
        "role": auth_user.role,
    }))
}
