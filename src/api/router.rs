use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::health;
use super::proxy;
use super::state::AppState;

/// Health routes plus the caching proxy for every other path
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/live", get(health::live_check))
        .fallback(proxy::proxy_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
