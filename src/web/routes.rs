use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::static_files::static_handler;
use super::state::AppState;

// UI Routes - web interface
pub fn ui_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::ui::index_handler))
        .route("/static/{*path}", get(static_handler))
}

// API Routes - REST API for programmatic access
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // Conversational turn
            .route("/chat", post(handlers::api::chat))
            // Direct SQL execution
            .route("/query", post(handlers::api::execute_query))
            // Speech input
            .route("/speech", post(handlers::api::speech_input))
            // Schema description
            .route("/schema", get(handlers::api::get_schema))
            // Recent turns
            .route("/history", get(handlers::api::get_history))
            // System status (includes the connectivity probe)
            .route("/status", get(handlers::api::system_status)),
    )
}
