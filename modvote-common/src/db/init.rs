//! Database initialization
//!
//! Creates the database on first run, applies pragmas, creates tables,
//! runs migrations and seeds default settings. Every step is idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets the sweep read while an interaction handler writes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    prepare_schema(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema
///
/// Restricted to a single connection: every SQLite in-memory connection
/// is its own database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    prepare_schema(&pool).await?;

    Ok(pool)
}

async fn prepare_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;
    create_guild_settings_table(pool).await?;
    create_escalations_table(pool).await?;
    create_escalation_votes_table(pool).await?;

    crate::db::migrations::run_migrations(pool).await?;

    crate::db::settings::init_default_settings(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores global runtime defaults as key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the per-guild settings table
///
/// `moderator_role_ids` is a JSON array of role ids.
pub async fn create_guild_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS guild_settings (
            guild_id TEXT PRIMARY KEY,
            quorum INTEGER NOT NULL CHECK (quorum > 0),
            moderator_role_ids TEXT NOT NULL DEFAULT '[]',
            restricted_role_id TEXT,
            log_channel_id TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the escalations table
///
/// Timestamps are Unix milliseconds. The CHECK keeps `resolved_at_ms` and
/// `resolution` either both set or both NULL.
pub async fn create_escalations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS escalations (
            id TEXT PRIMARY KEY,
            guild_id TEXT NOT NULL,
            thread_id TEXT NOT NULL,
            vote_message_id TEXT NOT NULL,
            reported_user_id TEXT NOT NULL,
            initiator_id TEXT NOT NULL,
            flags TEXT NOT NULL DEFAULT '{}',
            voting_strategy TEXT NOT NULL DEFAULT 'simple'
                CHECK (voting_strategy IN ('simple', 'majority')),
            created_at_ms INTEGER NOT NULL,
            scheduled_for_ms INTEGER NOT NULL,
            resolved_at_ms INTEGER,
            resolution TEXT
                CHECK (resolution IS NULL OR resolution IN ('track', 'timeout', 'restrict', 'kick', 'ban')),
            CHECK ((resolved_at_ms IS NULL) = (resolution IS NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_escalations_due ON escalations(resolved_at_ms, scheduled_for_ms)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_escalations_guild ON escalations(guild_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the escalation_votes table
///
/// UNIQUE(escalation_id, voter_id, resolution) backs the toggle semantics.
pub async fn create_escalation_votes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS escalation_votes (
            id TEXT PRIMARY KEY,
            escalation_id TEXT NOT NULL REFERENCES escalations(id),
            voter_id TEXT NOT NULL,
            resolution TEXT NOT NULL
                CHECK (resolution IN ('track', 'timeout', 'restrict', 'kick', 'ban')),
            voted_at_ms INTEGER NOT NULL,
            UNIQUE (escalation_id, voter_id, resolution)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_escalation_votes_escalation ON escalation_votes(escalation_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
