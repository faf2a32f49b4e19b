use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::storage::SqliteStore;

pub mod routes;

/// Server state
pub struct AppState {
    pub store: Arc<SqliteStore>,
    /// Data older than this is reported as needing a refresh
    pub max_age: chrono::Duration,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/universe/core", get(routes::universe_core))
        .route("/api/universe/search", get(routes::search))
        .route("/api/stocks", get(routes::list_stocks))
        .route("/api/stock/{ticker}", get(routes::get_stock))
        .route("/api/market/sectors", get(routes::sectors))
        .route("/api/market/top-movers", get(routes::top_movers))
        .route("/api/data/status", get(routes::data_status))
        .route("/api/refresh/history", get(routes::refresh_history))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(
    port: u16,
    store: Arc<SqliteStore>,
    max_age: chrono::Duration,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState { store, max_age });
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
