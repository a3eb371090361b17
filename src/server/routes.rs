// src/server/routes.rs
//! Axum router configuration for the sideload server
//!
//! `/api` routes accept any method and answer a wrong one with the JSON
//! 404 envelope. File routes are not compressed; packages are zip
//! archives already.

use crate::server::ServerState;
use crate::server::handlers::{self, api, files, plist};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    routing::{any, get},
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main application router
pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/api/list", any(api::list))
        .route("/api/info/:id", any(api::info))
        .route("/api/search", any(api::search))
        .route("/api/upload", any(api::upload))
        .route("/api/edit", any(api::edit))
        .route("/api/delete", any(api::delete))
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .layer(CompressionLayer::new());

    let file_routes = Router::new()
        .route("/plist/:file", get(plist::get_plist))
        .route("/pkg/:file", get(files::get_package))
        .route("/icon/:file", get(files::get_icon));

    let body_limit = state.config.max_upload_size;

    Router::new()
        .merge(api_routes)
        .merge(file_routes)
        .fallback(handlers::fallback)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

async fn stats(State(state): State<Arc<ServerState>>) -> Json<crate::server::MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
