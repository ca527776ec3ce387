use super::state::AppState;
use crate::analysis::{AnalysisRecord, TextInput};
use crate::error::AnalysisError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/text
/// Analyze a transcript and store the derived record under its session
pub async fn analyze_text(
    State(state): State<AppState>,
    Json(req): Json<TextInput>,
) -> impl IntoResponse {
    if req.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "text must not be empty");
    }

    info!("Analyzing {} chars of text", req.text.len());

    let result = match state.analyzer.text_sentiment(&req.text).await {
        Ok(result) => result,
        Err(AnalysisError::InvalidInput(reason)) => {
            return error_response(StatusCode::BAD_REQUEST, reason);
        }
        Err(e) => {
            error!("Tone analysis failed: {}", e);
            return error_response(StatusCode::BAD_GATEWAY, e.to_string());
        }
    };

    match req.session_timestamp {
        Some(session_timestamp) => {
            let record = AnalysisRecord::from_result(&result, &req.text, session_timestamp);
            info!(
                "Storing {} tones for session {}",
                record.tones.len(),
                session_timestamp
            );
            state.analyses.add(record).await;
        }
        None => warn!("Analysis without sessionTimestamp is not stored"),
    }

    (StatusCode::CREATED, Json(result)).into_response()
}

/// GET /api/sessions/:session_timestamp/analysis
/// Get stored analyses for a session
pub async fn get_session_analysis(
    State(state): State<AppState>,
    Path(session_timestamp): Path<i64>,
) -> impl IntoResponse {
    let records = state.analyses.get(session_timestamp).await;

    if records.is_empty() {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("No analysis for session {}", session_timestamp),
        );
    }

    (StatusCode::OK, Json(records)).into_response()
}

/// GET /api/sessions/:session_timestamp/timeline
/// Get what has been received for a session so far
pub async fn get_session_timeline(
    State(state): State<AppState>,
    Path(session_timestamp): Path<i64>,
) -> impl IntoResponse {
    let assembler = state.assembler.read().await;

    match assembler.timeline(session_timestamp) {
        Some(timeline) => (StatusCode::OK, Json(timeline)).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("Session {} not found", session_timestamp),
        ),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
