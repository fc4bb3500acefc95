use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::http::HeaderValue;
use tokio::{signal, sync::mpsc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use storefront_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }

    // First deployment convenience: admin account from config
    api::auth::ensure_bootstrap_admin(&db_pool, &cfg).await?;

    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    // Auth service for the login route and bearer middleware
    let auth_service = Arc::new(api::auth::AuthService::new(
        api::auth::AuthConfig::new(
            cfg.jwt_secret.clone(),
            Duration::from_secs(cfg.jwt_expiration as u64),
        ),
        db_arc.clone(),
    ));

    // Aggregate app services used by HTTP handlers and the chat interpreter
    let services = api::services::AppServices::new(
        db_arc.clone(),
        event_sender.clone(),
        auth_service,
        cfg.currency.clone(),
    );

    // Outbound messaging gateway
    let gateway: Arc<dyn api::messaging::MessagingGateway> =
        Arc::new(api::messaging::WhatsAppClient::new(
            cfg.wa_api_base_url.clone(),
            cfg.wa_phone_number_id.clone(),
            cfg.wa_api_token.clone(),
        ));
    if cfg.wa_api_token.is_empty() {
        info!("messaging provider token not configured; outbound sends will fail");
    }

    let interpreter = Arc::new(api::chat::CommandInterpreter::new(
        services.clone(),
        gateway.clone(),
        cfg.currency.clone(),
        cfg.chat_catalog_limit,
        cfg.chat_orders_limit,
    ));

    // Compose shared app state
    let app_state = api::AppState {
        db: db_arc,
        config: cfg.clone(),
        event_sender,
        services,
        gateway,
        interpreter,
    };

    // Build CORS layer from config
    let cors_layer = match cfg.cors_allowed_origins.as_ref() {
        Some(raw) => {
            let origins: Vec<HeaderValue> = raw
                .split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None if cfg.is_development() => {
            info!("using permissive CORS in development");
            CorsLayer::permissive()
        }
        None => {
            error!("Missing CORS configuration; set APP__CORS_ALLOWED_ORIGINS");
            return Err("Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS".into());
        }
    };

    let app = api::app_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer);

    // Bind and serve
    let addr = SocketAddr::new(cfg.host.parse()?, cfg.port);
    info!("storefront-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
