//! HTTP surface. Everything is mounted under `/api`.

pub mod auth;
pub mod chat;
pub mod health;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::middleware::cors::cors_layer;
use crate::models::AppState;

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth::router(state.clone()))
        .nest("/chat", chat::router(state.clone()));

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(state.config.server.max_upload_bytes))
        .layer(cors_layer(&state.config.server))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
