//! Guild settings and moderator authority
//!
//! Per-guild settings live in `guild_settings`. Guilds without a row fall back
//! to the global `default_quorum` and have no moderator roles, so nobody can
//! act on their escalations until settings are saved.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{EscalationError, Result};
use crate::gateway::PlatformGateway;

/// Settings for one guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSettings {
    pub guild_id: String,
    pub quorum: u32,
    #[serde(default)]
    pub moderator_role_ids: Vec<String>,
    /// Role assigned by the `restrict` resolution
    #[serde(default)]
    pub restricted_role_id: Option<String>,
    /// Channel that receives a copy of every resolution notice
    #[serde(default)]
    pub log_channel_id: Option<String>,
}

impl GuildSettings {
    pub fn defaults(guild_id: &str, default_quorum: u32) -> Self {
        Self {
            guild_id: guild_id.to_string(),
            quorum: default_quorum.max(1),
            moderator_role_ids: Vec::new(),
            restricted_role_id: None,
            log_channel_id: None,
        }
    }
}

/// Load a guild's settings; `None` when the guild has no row
pub async fn load_guild_settings(pool: &SqlitePool, guild_id: &str) -> Result<Option<GuildSettings>> {
    let row = sqlx::query(
        r#"
        SELECT guild_id, quorum, moderator_role_ids, restricted_role_id, log_channel_id
        FROM guild_settings
        WHERE guild_id = ?
        "#,
    )
    .bind(guild_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let roles_json: String = row.try_get("moderator_role_ids")?;
    let moderator_role_ids: Vec<String> = serde_json::from_str(&roles_json).map_err(|e| {
        modvote_common::Error::Corrupt(format!("guild {} moderator_role_ids: {}", guild_id, e))
    })?;
    let quorum: i64 = row.try_get("quorum")?;

    Ok(Some(GuildSettings {
        guild_id: row.try_get("guild_id")?,
        quorum: u32::try_from(quorum).unwrap_or(1).max(1),
        moderator_role_ids,
        restricted_role_id: row.try_get("restricted_role_id")?,
        log_channel_id: row.try_get("log_channel_id")?,
    }))
}

/// Insert or replace a guild's settings
pub async fn upsert_guild_settings(pool: &SqlitePool, settings: &GuildSettings) -> Result<()> {
    if settings.quorum == 0 {
        return Err(EscalationError::InvalidInput("quorum must be at least 1".to_string()));
    }

    let roles_json = serde_json::to_string(&settings.moderator_role_ids)
        .map_err(|e| modvote_common::Error::Internal(e.to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO guild_settings (guild_id, quorum, moderator_role_ids, restricted_role_id,
            log_channel_id, updated_at)
        VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(guild_id) DO UPDATE SET
            quorum = excluded.quorum,
            moderator_role_ids = excluded.moderator_role_ids,
            restricted_role_id = excluded.restricted_role_id,
            log_channel_id = excluded.log_channel_id,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&settings.guild_id)
    .bind(settings.quorum as i64)
    .bind(roles_json)
    .bind(&settings.restricted_role_id)
    .bind(&settings.log_channel_id)
    .execute(pool)
    .await?;

    info!(guild_id = %settings.guild_id, quorum = settings.quorum, "Saved guild settings");
    Ok(())
}

/// Read-through cache over `guild_settings`
///
/// Entries stay until `invalidate`/`clear`; writers must invalidate after
/// saving.
pub struct GuildSettingsCache {
    pool: SqlitePool,
    default_quorum: u32,
    entries: RwLock<HashMap<String, GuildSettings>>,
}

impl GuildSettingsCache {
    pub fn new(pool: SqlitePool, default_quorum: u32) -> Self {
        Self {
            pool,
            default_quorum,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, guild_id: &str) -> Result<GuildSettings> {
        if let Some(settings) = self.entries.read().await.get(guild_id) {
            return Ok(settings.clone());
        }

        let settings = load_guild_settings(&self.pool, guild_id)
            .await?
            .unwrap_or_else(|| GuildSettings::defaults(guild_id, self.default_quorum));

        debug!(guild_id, "Cached guild settings");
        self.entries
            .write()
            .await
            .insert(guild_id.to_string(), settings.clone());

        Ok(settings)
    }

    pub async fn invalidate(&self, guild_id: &str) {
        self.entries.write().await.remove(guild_id);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Who may act on escalations, and how many votes decide them
#[async_trait]
pub trait Authority: Send + Sync {
    async fn is_moderator(&self, guild_id: &str, user_id: &str) -> Result<bool>;

    async fn quorum(&self, guild_id: &str) -> Result<u32>;

    async fn guild_settings(&self, guild_id: &str) -> Result<GuildSettings>;
}

/// Authority backed by cached guild settings and live member roles
pub struct GuildAuthority {
    cache: Arc<GuildSettingsCache>,
    gateway: Arc<dyn PlatformGateway>,
}

impl GuildAuthority {
    pub fn new(cache: Arc<GuildSettingsCache>, gateway: Arc<dyn PlatformGateway>) -> Self {
        Self { cache, gateway }
    }

    pub fn cache(&self) -> &Arc<GuildSettingsCache> {
        &self.cache
    }
}

#[async_trait]
impl Authority for GuildAuthority {
    async fn is_moderator(&self, guild_id: &str, user_id: &str) -> Result<bool> {
        let settings = self.cache.get(guild_id).await?;
        if settings.moderator_role_ids.is_empty() {
            debug!(guild_id, "No moderator roles configured, denying");
            return Ok(false);
        }

        let member = self
            .gateway
            .fetch_member(guild_id, user_id)
            .await
            .map_err(|e| EscalationError::ExternalApi {
                operation: "fetch_member".to_string(),
                cause: e.to_string(),
            })?;

        Ok(member.is_some_and(|m| {
            m.roles
                .iter()
                .any(|role| settings.moderator_role_ids.contains(role))
        }))
    }

    async fn quorum(&self, guild_id: &str) -> Result<u32> {
        Ok(self.cache.get(guild_id).await?.quorum)
    }

    async fn guild_settings(&self, guild_id: &str) -> Result<GuildSettings> {
        self.cache.get(guild_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modvote_common::db::init_memory_database;

    fn settings(guild_id: &str) -> GuildSettings {
        GuildSettings {
            guild_id: guild_id.to_string(),
            quorum: 2,
            moderator_role_ids: vec!["mods".to_string()],
            restricted_role_id: Some("jail".to_string()),
            log_channel_id: None,
        }
    }

    #[tokio::test]
    async fn test_missing_guild_loads_none() {
        let pool = init_memory_database().await.unwrap();
        assert_eq!(load_guild_settings(&pool, "g1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_then_load() {
        let pool = init_memory_database().await.unwrap();
        upsert_guild_settings(&pool, &settings("g1")).await.unwrap();

        let mut changed = settings("g1");
        changed.quorum = 5;
        changed.log_channel_id = Some("logs".to_string());
        upsert_guild_settings(&pool, &changed).await.unwrap();

        assert_eq!(load_guild_settings(&pool, "g1").await.unwrap(), Some(changed));
    }

    #[tokio::test]
    async fn test_upsert_rejects_zero_quorum() {
        let pool = init_memory_database().await.unwrap();
        let mut bad = settings("g1");
        bad.quorum = 0;

        let err = upsert_guild_settings(&pool, &bad).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn test_cache_defaults_and_invalidate() {
        let pool = init_memory_database().await.unwrap();
        let cache = GuildSettingsCache::new(pool.clone(), 3);

        let before = cache.get("g1").await.unwrap();
        assert_eq!(before.quorum, 3);
        assert!(before.moderator_role_ids.is_empty());

        upsert_guild_settings(&pool, &settings("g1")).await.unwrap();
        // Still the cached default until invalidated
        assert_eq!(cache.get("g1").await.unwrap().quorum, 3);

        cache.invalidate("g1").await;
        assert_eq!(cache.get("g1").await.unwrap().quorum, 2);

        cache.clear().await;
        assert_eq!(cache.len().await, 0);
    }
}
