//! Guild settings endpoint

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use super::ApiError;
use crate::authority::{upsert_guild_settings, GuildSettings};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GuildSettingsRequest {
    pub quorum: u32,
    #[serde(default)]
    pub moderator_role_ids: Vec<String>,
    pub restricted_role_id: Option<String>,
    pub log_channel_id: Option<String>,
}

/// PUT /api/guilds/:guild_id/settings
pub async fn put_guild_settings(
    State(state): State<AppState>,
    Path(guild_id): Path<String>,
    Json(req): Json<GuildSettingsRequest>,
) -> Result<Json<GuildSettings>, ApiError> {
    let settings = GuildSettings {
        guild_id,
        quorum: req.quorum,
        moderator_role_ids: req.moderator_role_ids,
        restricted_role_id: req.restricted_role_id,
        log_channel_id: req.log_channel_id,
    };

    upsert_guild_settings(&state.db, &settings).await?;
    state.settings_cache.invalidate(&settings.guild_id).await;

    Ok(Json(settings))
}
