use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use providerdesk::config::AppConfig;
use providerdesk::db;
use providerdesk::handlers;
use providerdesk::state::AppState;
use providerdesk::store::{DataStore, SqliteStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    let store = SqliteStore::new(conn);
    store.connect().await?;

    tracing::info!(
        database = %config.database_url,
        timezone = %config.viewer_timezone,
        "store ready"
    );

    let state = Arc::new(AppState {
        store: Arc::new(store),
        config: config.clone(),
    });

    let app = handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
