//! HTTP API for the receiving backend
//!
//! - POST /api/text - Tone analysis of a transcript, stored per session
//! - GET /api/sessions/:session_timestamp/analysis - Stored analyses
//! - GET /api/sessions/:session_timestamp/timeline - Assembled session timeline
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::ErrorResponse;
pub use routes::create_router;
pub use state::AppState;
