use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use slotbook::config::AppConfig;
use slotbook::db;
use slotbook::handlers;
use slotbook::services::ai::openai::OpenAiProvider;
use slotbook::services::messaging::whatsapp::WhatsAppProvider;
use slotbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    tracing::info!("using NLU model {} at {}", config.llm_model, config.llm_api_url);
    let nlu = OpenAiProvider::new(
        config.llm_api_url.clone(),
        config.llm_api_key.clone(),
        config.llm_model.clone(),
    );
    let messaging = WhatsAppProvider::new(config.whatsapp_access_token.clone());

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        nlu: Box::new(nlu),
        messaging: Box::new(messaging),
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/webhook",
            get(handlers::webhook::verify_webhook).post(handlers::webhook::inbound_webhook),
        )
        .route("/api/bookings/pending", get(handlers::admin::get_pending))
        .route("/api/bookings/requests", get(handlers::admin::get_requests))
        .route(
            "/api/bookings/:reference/approve",
            post(handlers::admin::approve_request),
        )
        .route(
            "/api/bookings/:reference/reject",
            post(handlers::admin::reject_request),
        )
        .route(
            "/api/bookings/:reference/cancel",
            post(handlers::admin::cancel_request),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
