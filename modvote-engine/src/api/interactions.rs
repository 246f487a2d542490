//! Interaction endpoint

use axum::{extract::State, Json};
use tracing::debug;

use super::ApiError;
use crate::interactions::{Interaction, InteractionReply};
use crate::AppState;

/// POST /api/interactions
///
/// Body: `{custom_id, guild_id, user_id}` from a button click.
pub async fn post_interaction(
    State(state): State<AppState>,
    Json(interaction): Json<Interaction>,
) -> Result<Json<InteractionReply>, ApiError> {
    debug!(
        custom_id = %interaction.custom_id,
        guild_id = %interaction.guild_id,
        user_id = %interaction.user_id,
        "Interaction received"
    );

    let reply = state.interactions.handle(&interaction).await?;
    Ok(Json(reply))
}
