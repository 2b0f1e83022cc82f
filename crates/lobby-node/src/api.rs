//! HTTP router and shared application state.

use axum::{response::IntoResponse, routing::get, Json, Router};
use lobby_realtime::Lobby;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::ws::realtime_routes;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The lobby every socket joins.
    pub lobby: Arc<Lobby>,
}

impl AppState {
    /// Create state around `lobby`.
    pub fn new(lobby: Arc<Lobby>) -> Self {
        Self { lobby }
    }
}

/// Creates the node's router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(realtime_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
