//! Settings database access
//!
//! Global runtime defaults stored in the `settings` key-value table.
//! Missing or NULL values are reset to built-in defaults at startup.

use crate::{Error, Result};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{info, warn};

pub const DEFAULT_QUORUM_KEY: &str = "default_quorum";
pub const TIMEOUT_DURATION_HOURS_KEY: &str = "timeout_duration_hours";
pub const BAN_DELETE_MESSAGE_SECONDS_KEY: &str = "ban_delete_message_seconds";
pub const SWEEP_INTERVAL_SECS_KEY: &str = "sweep_interval_secs";

const DEFAULT_QUORUM: u32 = 3;
const DEFAULT_TIMEOUT_DURATION_HOURS: u32 = 24;
const DEFAULT_BAN_DELETE_MESSAGE_SECONDS: u32 = 0;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Runtime settings loaded from the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Quorum for guilds without their own setting
    pub default_quorum: u32,
    /// Length of the communication timeout applied by the `timeout` resolution
    pub timeout_duration_hours: u32,
    /// Message history purged when banning
    pub ban_delete_message_seconds: u32,
    /// Interval between auto-resolution sweeps
    pub sweep_interval_secs: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            default_quorum: DEFAULT_QUORUM,
            timeout_duration_hours: DEFAULT_TIMEOUT_DURATION_HOURS,
            ban_delete_message_seconds: DEFAULT_BAN_DELETE_MESSAGE_SECONDS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

/// Load all runtime settings, falling back to defaults for absent keys
pub async fn load_runtime_settings(db: &SqlitePool) -> Result<RuntimeSettings> {
    let defaults = RuntimeSettings::default();

    Ok(RuntimeSettings {
        default_quorum: get_setting(db, DEFAULT_QUORUM_KEY)
            .await?
            .unwrap_or(defaults.default_quorum)
            .max(1),
        timeout_duration_hours: get_setting(db, TIMEOUT_DURATION_HOURS_KEY)
            .await?
            .unwrap_or(defaults.timeout_duration_hours),
        ban_delete_message_seconds: get_setting(db, BAN_DELETE_MESSAGE_SECONDS_KEY)
            .await?
            .unwrap_or(defaults.ban_delete_message_seconds),
        sweep_interval_secs: get_setting(db, SWEEP_INTERVAL_SECS_KEY)
            .await?
            .unwrap_or(defaults.sweep_interval_secs)
            .max(1),
    })
}

/// Initialize or repair default settings
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    let defaults = RuntimeSettings::default();

    ensure_setting(pool, DEFAULT_QUORUM_KEY, &defaults.default_quorum.to_string()).await?;
    ensure_setting(
        pool,
        TIMEOUT_DURATION_HOURS_KEY,
        &defaults.timeout_duration_hours.to_string(),
    )
    .await?;
    ensure_setting(
        pool,
        BAN_DELETE_MESSAGE_SECONDS_KEY,
        &defaults.ban_delete_message_seconds.to_string(),
    )
    .await?;
    ensure_setting(
        pool,
        SWEEP_INTERVAL_SECS_KEY,
        &defaults.sweep_interval_secs.to_string(),
    )
    .await?;

    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// Missing keys are created; NULL values are reset to the default.
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    // INSERT OR IGNORE tolerates concurrent initialization
    let inserted = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?
        .rows_affected();

    if inserted > 0 {
        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let reset = sqlx::query("UPDATE settings SET value = ? WHERE key = ? AND value IS NULL")
        .bind(default_value)
        .bind(key)
        .execute(pool)
        .await?
        .rows_affected();

    if reset > 0 {
        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}

/// Generic setting getter
pub async fn get_setting<T: FromStr>(db: &SqlitePool, key: &str) -> Result<Option<T>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await?;

    match value.flatten() {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter (insert or update)
pub async fn set_setting<T: ToString>(db: &SqlitePool, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;

    #[tokio::test]
    async fn test_defaults_seeded() {
        let pool = init_memory_database().await.unwrap();
        let settings = load_runtime_settings(&pool).await.unwrap();
        assert_eq!(settings, RuntimeSettings::default());
    }

    #[tokio::test]
    async fn test_set_and_get_setting() {
        let pool = init_memory_database().await.unwrap();
        set_setting(&pool, DEFAULT_QUORUM_KEY, 5u32).await.unwrap();

        let quorum: Option<u32> = get_setting(&pool, DEFAULT_QUORUM_KEY).await.unwrap();
        assert_eq!(quorum, Some(5));
        assert_eq!(load_runtime_settings(&pool).await.unwrap().default_quorum, 5);
    }

    #[tokio::test]
    async fn test_get_missing_setting() {
        let pool = init_memory_database().await.unwrap();
        let value: Option<u32> = get_setting(&pool, "no_such_key").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_unparseable_setting_is_config_error() {
        let pool = init_memory_database().await.unwrap();
        set_setting(&pool, TIMEOUT_DURATION_HOURS_KEY, "soon").await.unwrap();

        let result = get_setting::<u32>(&pool, TIMEOUT_DURATION_HOURS_KEY).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_null_setting_reset_to_default() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query("UPDATE settings SET value = NULL WHERE key = ?")
            .bind(SWEEP_INTERVAL_SECS_KEY)
            .execute(&pool)
            .await
            .unwrap();

        init_default_settings(&pool).await.unwrap();

        let interval: Option<u64> = get_setting(&pool, SWEEP_INTERVAL_SECS_KEY).await.unwrap();
        assert_eq!(interval, Some(DEFAULT_SWEEP_INTERVAL_SECS));
    }

    #[tokio::test]
    async fn test_zero_quorum_clamped_to_one() {
        let pool = init_memory_database().await.unwrap();
        set_setting(&pool, DEFAULT_QUORUM_KEY, 0u32).await.unwrap();
        assert_eq!(load_runtime_settings(&pool).await.unwrap().default_quorum, 1);
    }
}
