use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "EUR";
const DEFAULT_CHAT_CATALOG_LIMIT: u64 = 10;
const DEFAULT_CHAT_ORDERS_LIMIT: u64 = 5;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret key
    #[validate(length(min = 32), custom = "validate_secret")]
    pub jwt_secret: String,

    /// JWT expiration time in seconds
    pub jwt_expiration: usize,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Token the provider must echo in the webhook verification challenge
    #[validate(length(min = 8))]
    pub webhook_verify_token: String,

    /// Application secret used to check X-Hub-Signature-256 payload signatures
    #[validate(length(min = 16), custom = "validate_secret")]
    pub webhook_app_secret: String,

    /// Messaging provider API base URL
    #[serde(default = "default_wa_api_base_url")]
    pub wa_api_base_url: String,

    /// Messaging provider bearer token
    #[serde(default)]
    pub wa_api_token: String,

    /// Messaging provider sender phone-number id
    #[serde(default)]
    pub wa_phone_number_id: String,

    /// Bootstrap admin account, created at startup when the users table is empty
    #[serde(default)]
    pub admin_email: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,

    /// ISO currency code applied to orders
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Max products shown by the chat catalog command
    #[serde(default = "default_chat_catalog_limit")]
    pub chat_catalog_limit: u64,

    /// Max orders shown by the chat order-tracking command
    #[serde(default = "default_chat_orders_limit")]
    pub chat_orders_limit: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_wa_api_base_url() -> String {
    "https://graph.facebook.com/v19.0".to_string()
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_chat_catalog_limit() -> u64 {
    DEFAULT_CHAT_CATALOG_LIMIT
}
fn default_chat_orders_limit() -> u64 {
    DEFAULT_CHAT_ORDERS_LIMIT
}

/// Reject placeholder secrets that slipped in from documentation.
fn validate_secret(value: &str) -> Result<(), ValidationError> {
    let lowered = value.to_lowercase();
    if lowered.contains("changeme") || lowered.contains("placeholder") {
        return Err(ValidationError::new("placeholder_secret"));
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

impl AppConfig {
    /// Programmatic constructor, used by tests and tools. Everything not
    /// passed explicitly takes the same defaults as `load_config`.
    pub fn new(
        database_url: String,
        jwt_secret: String,
        webhook_verify_token: String,
        webhook_app_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            jwt_expiration: 3600,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            webhook_verify_token,
            webhook_app_secret,
            wa_api_base_url: default_wa_api_base_url(),
            wa_api_token: String::new(),
            wa_phone_number_id: String::new(),
            admin_email: None,
            admin_password: None,
            currency: default_currency(),
            chat_catalog_limit: default_chat_catalog_limit(),
            chat_orders_limit: default_chat_orders_limit(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // NOTE: jwt_secret and webhook_app_secret have no defaults - they MUST be
    // provided via environment variable or config file.
    let builder = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("jwt_expiration", 3600)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    for secret in ["jwt_secret", "webhook_app_secret", "webhook_verify_token"] {
        if config.get_string(secret).is_err() {
            error!(
                "{} is not configured. Set APP__{} with a secure random string.",
                secret,
                secret.to_uppercase()
            );
            return Err(AppConfigError::Load(ConfigError::NotFound(format!(
                "{} is required but not configured",
                secret
            ))));
        }
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    Ok(app_config)
}

/// Initialise the global tracing subscriber. `RUST_LOG` wins over the
/// configured level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("storefront_api={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".to_string(),
            "a_unit_test_secret_that_is_long_enough_00".to_string(),
            "verify-token".to_string(),
            "webhook_secret_long_enough".to_string(),
            "127.0.0.1".to_string(),
            18080,
            "test".to_string(),
        )
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn short_jwt_secret_is_rejected() {
        let mut cfg = base_config();
        cfg.jwt_secret = "short".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn placeholder_webhook_secret_is_rejected() {
        let mut cfg = base_config();
        cfg.webhook_app_secret = "CHANGEME_CHANGEME_CHANGEME".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_environment_counts_as_development() {
        assert!(base_config().is_development());
    }
}
