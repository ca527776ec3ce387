use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Analysis
        .route("/api/text", post(handlers::analyze_text))
        // Session queries
        .route(
            "/api/sessions/:session_timestamp/analysis",
            get(handlers::get_session_analysis),
        )
        .route(
            "/api/sessions/:session_timestamp/timeline",
            get(handlers::get_session_timeline),
        )
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
