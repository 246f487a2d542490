//! Tests for database initialization
//!
//! Covers first-run creation, reopening an existing database, default
//! settings seeding and the escalation table constraints.

use modvote_common::db::init::init_database;
use modvote_common::db::settings::{load_runtime_settings, RuntimeSettings};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("modvote.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("modvote.db");

    let pool1 = init_database(&db_path).await.unwrap();
    sqlx::query("UPDATE settings SET value = '7' WHERE key = 'default_quorum'")
        .execute(&pool1)
        .await
        .unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await.unwrap();
    let settings = load_runtime_settings(&pool2).await.unwrap();

    // Reopening must not overwrite existing values
    assert_eq!(settings.default_quorum, 7);
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("modvote.db")).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 4);

    assert_eq!(load_runtime_settings(&pool).await.unwrap(), RuntimeSettings::default());
}

#[tokio::test]
async fn test_resolution_requires_resolved_at() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("modvote.db")).await.unwrap();

    // resolution without resolved_at violates the pairing CHECK
    let result = sqlx::query(
        r#"
        INSERT INTO escalations (id, guild_id, thread_id, vote_message_id, reported_user_id,
            initiator_id, flags, voting_strategy, created_at_ms, scheduled_for_ms, resolution)
        VALUES ('e1', 'g', 't', 'm', 'u', 'i', '{"quorum":3}', 'simple', 0, 0, 'ban')
        "#,
    )
    .execute(&pool)
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_vote_triple_unique() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("modvote.db")).await.unwrap();

    sqlx::query(
        r#"
        INSERT INTO escalations (id, guild_id, thread_id, vote_message_id, reported_user_id,
            initiator_id, flags, voting_strategy, created_at_ms, scheduled_for_ms)
        VALUES ('e1', 'g', 't', 'm', 'u', 'i', '{"quorum":3}', 'simple', 0, 0)
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let insert = |id: &'static str| {
        sqlx::query(
            "INSERT INTO escalation_votes (id, escalation_id, voter_id, resolution, voted_at_ms) VALUES (?, 'e1', 'v1', 'ban', 0)",
        )
        .bind(id)
    };

    insert("a").execute(&pool).await.unwrap();
    let duplicate = insert("b").execute(&pool).await;
    assert!(duplicate.is_err());
}
