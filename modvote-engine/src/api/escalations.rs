//! Escalation endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use modvote_common::{Escalation, NewEscalation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApiError;
use crate::tally::Tally;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateEscalationRequest {
    /// Stable id for idempotent retries; generated when omitted
    pub id: Option<String>,
    pub guild_id: String,
    pub thread_id: String,
    pub vote_message_id: String,
    pub reported_user_id: String,
    pub initiator_id: String,
    /// Overrides the guild quorum
    pub quorum: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct EscalationResponse {
    pub escalation: Escalation,
    pub tally: Tally,
}

/// POST /api/escalations
pub async fn create_escalation(
    State(state): State<AppState>,
    Json(req): Json<CreateEscalationRequest>,
) -> Result<(StatusCode, Json<Escalation>), ApiError> {
    let quorum = match req.quorum {
        Some(quorum) => quorum,
        None => state.authority.quorum(&req.guild_id).await?,
    };

    let escalation = state
        .processor
        .open(NewEscalation {
            id: req.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            guild_id: req.guild_id,
            thread_id: req.thread_id,
            vote_message_id: req.vote_message_id,
            reported_user_id: req.reported_user_id,
            initiator_id: req.initiator_id,
            quorum,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(escalation)))
}

/// GET /api/escalations/:id
pub async fn get_escalation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EscalationResponse>, ApiError> {
    let service = state.processor.service();
    let escalation = service.get(&id).await?;
    let tally = service.tally_for(&id).await?;

    Ok(Json(EscalationResponse { escalation, tally }))
}
