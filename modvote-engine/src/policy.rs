//! Scheduling policy
//!
//! Deadline for auto-resolution shrinks as votes come in:
//! `timeout_hours(v) = max(0, 24 - 8 * v)`, i.e. 24h, 16h, 8h, then due
//! immediately once three moderators have voted.

use chrono::{DateTime, Duration, Utc};
use modvote_common::VotingStrategy;

use crate::tally::Tally;

/// Hours before an escalation with no votes auto-resolves
pub const BASE_TIMEOUT_HOURS: i64 = 24;

/// Hours removed from the deadline per distinct voter
pub const HOURS_PER_VOTE: i64 = 8;

/// Auto-resolution delay for a given number of distinct voters
pub fn timeout_hours(vote_count: usize) -> i64 {
    let votes = i64::try_from(vote_count).unwrap_or(i64::MAX);
    BASE_TIMEOUT_HOURS
        .saturating_sub(HOURS_PER_VOTE.saturating_mul(votes))
        .max(0)
}

/// Deadline for an escalation created at `created_at`
pub fn scheduled_for(created_at: DateTime<Utc>, vote_count: usize) -> DateTime<Utc> {
    created_at + Duration::hours(timeout_hours(vote_count))
}

/// Whether the deadline has passed
pub fn is_due(created_at: DateTime<Utc>, vote_count: usize, now: DateTime<Utc>) -> bool {
    now - created_at >= Duration::hours(timeout_hours(vote_count))
}

/// Whether a vote should resolve the escalation before its deadline
///
/// Majority escalations never resolve early.
pub fn should_trigger_early(tally: &Tally, quorum: u32, strategy: VotingStrategy) -> bool {
    match strategy {
        VotingStrategy::Simple => tally.leader_count >= quorum as usize,
        VotingStrategy::Majority => false,
    }
}
