//! Escalation persistence
//!
//! `EscalationStore` is the seam between the service and storage. The SQLite
//! implementation keeps every state transition a single statement or a
//! single transaction; terminal transitions are conditional writes
//! (`... WHERE resolved_at_ms IS NULL`) so concurrent triggers cannot both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use modvote_common::time::{from_millis, to_millis};
use modvote_common::{Escalation, EscalationFlags, Resolution, VoteRecord, VotingStrategy};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;

/// Result of toggling a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteToggle {
    /// true when the vote was inserted, false when it was retracted
    pub is_new: bool,
}

#[async_trait]
pub trait EscalationStore: Send + Sync {
    /// Insert unless a row with the same id exists; returns the stored row
    async fn insert_escalation(&self, escalation: &Escalation) -> Result<Escalation>;

    async fn get_escalation(&self, id: &str) -> Result<Option<Escalation>>;

    /// Votes in the order they were cast
    async fn list_votes(&self, escalation_id: &str) -> Result<Vec<VoteRecord>>;

    /// Delete the (escalation, voter, resolution) vote if present, else insert it
    async fn toggle_vote(
        &self,
        escalation_id: &str,
        voter_id: &str,
        resolution: Resolution,
        voted_at: DateTime<Utc>,
    ) -> Result<VoteToggle>;

    async fn count_distinct_voters(&self, escalation_id: &str) -> Result<usize>;

    /// Set strategy and deadline on an open escalation; false if resolved or missing
    async fn set_strategy(
        &self,
        id: &str,
        strategy: VotingStrategy,
        scheduled_for: DateTime<Utc>,
    ) -> Result<bool>;

    /// Move the deadline earlier (never later) on an open escalation
    async fn tighten_schedule(&self, id: &str, scheduled_for: DateTime<Utc>) -> Result<bool>;

    /// Resolve only if still open; false means someone else got there first
    async fn resolve_if_open(
        &self,
        id: &str,
        resolution: Resolution,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Open escalations whose deadline is at or before `now`
    async fn due_escalations(&self, now: DateTime<Utc>) -> Result<Vec<Escalation>>;
}

const ESCALATION_COLUMNS: &str = "id, guild_id, thread_id, vote_message_id, reported_user_id, \
     initiator_id, flags, voting_strategy, created_at_ms, scheduled_for_ms, resolved_at_ms, resolution";

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteEscalationStore {
    pool: SqlitePool,
}

impl SqliteEscalationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn corrupt(msg: String) -> crate::error::EscalationError {
    modvote_common::Error::Corrupt(msg).into()
}

fn timestamp(column: &str, millis: i64) -> Result<DateTime<Utc>> {
    from_millis(millis).ok_or_else(|| corrupt(format!("{} out of range: {}", column, millis)))
}

fn escalation_from_row(row: &SqliteRow) -> Result<Escalation> {
    let id: String = row.try_get("id")?;

    let flags_json: String = row.try_get("flags")?;
    let flags: EscalationFlags = serde_json::from_str(&flags_json)
        .map_err(|e| corrupt(format!("escalation {} flags: {}", id, e)))?;

    let strategy: String = row.try_get("voting_strategy")?;
    let resolved_at_ms: Option<i64> = row.try_get("resolved_at_ms")?;
    let resolution: Option<String> = row.try_get("resolution")?;

    Ok(Escalation {
        guild_id: row.try_get("guild_id")?,
        thread_id: row.try_get("thread_id")?,
        vote_message_id: row.try_get("vote_message_id")?,
        reported_user_id: row.try_get("reported_user_id")?,
        initiator_id: row.try_get("initiator_id")?,
        flags,
        voting_strategy: strategy.parse::<VotingStrategy>()?,
        created_at: timestamp("created_at_ms", row.try_get("created_at_ms")?)?,
        scheduled_for: timestamp("scheduled_for_ms", row.try_get("scheduled_for_ms")?)?,
        resolved_at: resolved_at_ms
            .map(|ms| timestamp("resolved_at_ms", ms))
            .transpose()?,
        resolution: resolution.map(|r| r.parse::<Resolution>()).transpose()?,
        id,
    })
}

fn vote_from_row(row: &SqliteRow) -> Result<VoteRecord> {
    let resolution: String = row.try_get("resolution")?;

    Ok(VoteRecord {
        id: row.try_get("id")?,
        escalation_id: row.try_get("escalation_id")?,
        voter_id: row.try_get("voter_id")?,
        resolution: resolution.parse::<Resolution>()?,
        voted_at: timestamp("voted_at_ms", row.try_get("voted_at_ms")?)?,
    })
}

#[async_trait]
impl EscalationStore for SqliteEscalationStore {
    async fn insert_escalation(&self, escalation: &Escalation) -> Result<Escalation> {
        let flags = serde_json::to_string(&escalation.flags)
            .map_err(|e| modvote_common::Error::Internal(e.to_string()))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO escalations (id, guild_id, thread_id, vote_message_id, reported_user_id,
                initiator_id, flags, voting_strategy, created_at_ms, scheduled_for_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&escalation.id)
        .bind(&escalation.guild_id)
        .bind(&escalation.thread_id)
        .bind(&escalation.vote_message_id)
        .bind(&escalation.reported_user_id)
        .bind(&escalation.initiator_id)
        .bind(flags)
        .bind(escalation.voting_strategy.as_str())
        .bind(to_millis(escalation.created_at))
        .bind(to_millis(escalation.scheduled_for))
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            debug!(escalation_id = %escalation.id, "Escalation already exists, creation is a no-op");
        }

        self.get_escalation(&escalation.id)
            .await?
            .ok_or_else(|| corrupt(format!("escalation {} vanished after insert", escalation.id)))
    }

    async fn get_escalation(&self, id: &str) -> Result<Option<Escalation>> {
        let sql = format!("SELECT {} FROM escalations WHERE id = ?", ESCALATION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(escalation_from_row).transpose()
    }

    async fn list_votes(&self, escalation_id: &str) -> Result<Vec<VoteRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, escalation_id, voter_id, resolution, voted_at_ms
            FROM escalation_votes
            WHERE escalation_id = ?
            ORDER BY voted_at_ms, rowid
            "#,
        )
        .bind(escalation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(vote_from_row).collect()
    }

    async fn toggle_vote(
        &self,
        escalation_id: &str,
        voter_id: &str,
        resolution: Resolution,
        voted_at: DateTime<Utc>,
    ) -> Result<VoteToggle> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            "DELETE FROM escalation_votes WHERE escalation_id = ? AND voter_id = ? AND resolution = ?",
        )
        .bind(escalation_id)
        .bind(voter_id)
        .bind(resolution.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if deleted > 0 {
            tx.commit().await?;
            return Ok(VoteToggle { is_new: false });
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO escalation_votes (id, escalation_id, voter_id, resolution, voted_at_ms)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(escalation_id)
        .bind(voter_id)
        .bind(resolution.as_str())
        .bind(to_millis(voted_at))
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {
                tx.commit().await?;
                Ok(VoteToggle { is_new: true })
            }
            // A concurrent click inserted the same triple first; the vote exists either way
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                debug!(escalation_id, voter_id, %resolution, "Lost vote toggle race, treating as cast");
                tx.rollback().await?;
                Ok(VoteToggle { is_new: true })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn count_distinct_voters(&self, escalation_id: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT voter_id) FROM escalation_votes WHERE escalation_id = ?",
        )
        .bind(escalation_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn set_strategy(
        &self,
        id: &str,
        strategy: VotingStrategy,
        scheduled_for: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE escalations
            SET voting_strategy = ?, scheduled_for_ms = ?
            WHERE id = ? AND resolved_at_ms IS NULL
            "#,
        )
        .bind(strategy.as_str())
        .bind(to_millis(scheduled_for))
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated == 1)
    }

    async fn tighten_schedule(&self, id: &str, scheduled_for: DateTime<Utc>) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE escalations
            SET scheduled_for_ms = MIN(scheduled_for_ms, ?)
            WHERE id = ? AND resolved_at_ms IS NULL
            "#,
        )
        .bind(to_millis(scheduled_for))
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated == 1)
    }

    async fn resolve_if_open(
        &self,
        id: &str,
        resolution: Resolution,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE escalations
            SET resolved_at_ms = ?, resolution = ?
            WHERE id = ? AND resolved_at_ms IS NULL
            "#,
        )
        .bind(to_millis(resolved_at))
        .bind(resolution.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated == 1)
    }

    async fn due_escalations(&self, now: DateTime<Utc>) -> Result<Vec<Escalation>> {
        let sql = format!(
            "SELECT {} FROM escalations WHERE resolved_at_ms IS NULL AND scheduled_for_ms <= ? \
             ORDER BY scheduled_for_ms, created_at_ms",
            ESCALATION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(to_millis(now))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(escalation_from_row).collect()
    }
}
