//! Manual sweep trigger

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::ApiError;
use crate::AppState;

/// POST /api/sweep
///
/// Runs a sweep now. 409 when the timer's sweep is already in progress.
pub async fn post_sweep(State(state): State<AppState>) -> Result<Response, ApiError> {
    match state.scheduler.try_sweep().await? {
        Some(report) => Ok(Json(report).into_response()),
        None => Ok((
            StatusCode::CONFLICT,
            Json(json!({
                "error": "sweep_busy",
                "message": "A sweep is already running",
            })),
        )
            .into_response()),
    }
}
