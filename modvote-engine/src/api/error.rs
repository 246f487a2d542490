//! HTTP mapping for engine errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::error::EscalationError;

/// Engine error rendered as `{error, message}` with a matching status
#[derive(Debug)]
pub struct ApiError(pub EscalationError);

impl From<EscalationError> for ApiError {
    fn from(err: EscalationError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EscalationError::NotAuthorized { .. } => StatusCode::FORBIDDEN,
            EscalationError::NotFound { .. } => StatusCode::NOT_FOUND,
            EscalationError::AlreadyResolved { .. } | EscalationError::NoLeader { .. } => {
                StatusCode::CONFLICT
            }
            EscalationError::InvalidInput(_)
            | EscalationError::Common(modvote_common::Error::InvalidInput(_)) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }

        let body = Json(json!({
            "error": self.0.kind(),
            "message": self.0.user_message(),
        }));

        (status, body).into_response()
    }
}
