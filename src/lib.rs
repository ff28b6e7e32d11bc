//! Rap Rounds
//!
//! REST service for contributing words to the active rap-song round, voting on
//! them, and browsing past rounds with their generated songs. Round lifecycle
//! and song generation belong to the admin application sharing the store.

pub mod aggregate;
pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use db::Repository;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/revision", get(api::get_revision))
        // Current round
        .route("/rounds/active", get(api::get_active_round))
        .route("/rounds/{id}/words", post(api::add_word))
        .route("/rounds/{id}/words/{word_id}/votes", post(api::cast_vote))
        // History
        .route("/rounds", get(api::list_rounds))
        .route("/rounds/previous", get(api::list_previous_rounds))
        .route("/rounds/{id}", get(api::get_round))
        .route("/rounds/{id}/votes", post(api::cast_song_vote));

    // Health check
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
