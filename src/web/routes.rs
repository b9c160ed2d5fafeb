use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// API Routes - REST API for programmatic access
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // Projects
            .route("/projects", get(handlers::api::list_projects))
            .route("/projects/{project}/schema", get(handlers::api::get_schema))

            // Questions and direct SQL
            .route("/projects/{project}/ask", post(handlers::api::ask))
            .route("/projects/{project}/query", post(handlers::api::run_query))

            // Conversation log
            .route("/sessions/{session_id}/messages", get(handlers::api::session_messages))

            // System status
            .route("/status", get(handlers::api::system_status)),
    )
}
