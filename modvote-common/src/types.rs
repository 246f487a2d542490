//! Escalation domain types
//!
//! Platform identifiers (guild, channel, message, user) are opaque strings.
//! Escalation and vote ids are UUID strings supplied by the caller or
//! generated on creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Outcome a moderator can vote for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Keep an eye on the user, no action taken
    Track,
    /// Communication timeout for a fixed duration
    Timeout,
    /// Assign the guild's restricted role
    Restrict,
    /// Remove the member from the guild
    Kick,
    /// Ban the user from the guild
    Ban,
}

impl Resolution {
    /// All resolutions in display order (least to most severe)
    pub const ALL: [Resolution; 5] = [
        Resolution::Track,
        Resolution::Timeout,
        Resolution::Restrict,
        Resolution::Kick,
        Resolution::Ban,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Track => "track",
            Resolution::Timeout => "timeout",
            Resolution::Restrict => "restrict",
            Resolution::Kick => "kick",
            Resolution::Ban => "ban",
        }
    }

    /// Button label shown on the vote message
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Track => "Track",
            Resolution::Timeout => "Timeout",
            Resolution::Restrict => "Restrict",
            Resolution::Kick => "Kick",
            Resolution::Ban => "Ban",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "track" => Ok(Resolution::Track),
            "timeout" => Ok(Resolution::Timeout),
            "restrict" => Ok(Resolution::Restrict),
            "kick" => Ok(Resolution::Kick),
            "ban" => Ok(Resolution::Ban),
            other => Err(Error::InvalidInput(format!("unknown resolution '{}'", other))),
        }
    }
}

/// How an escalation decides when to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VotingStrategy {
    /// Resolve as soon as the leading option reaches quorum
    Simple,
    /// Always wait for the deadline, then take the plurality
    Majority,
}

impl VotingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            VotingStrategy::Simple => "simple",
            VotingStrategy::Majority => "majority",
        }
    }
}

impl fmt::Display for VotingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VotingStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(VotingStrategy::Simple),
            "majority" => Ok(VotingStrategy::Majority),
            other => Err(Error::InvalidInput(format!("unknown voting strategy '{}'", other))),
        }
    }
}

/// Flags blob persisted alongside an escalation (JSON)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationFlags {
    pub quorum: u32,
}

/// One voting/resolution cycle for a single reported user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub id: String,
    pub guild_id: String,
    pub thread_id: String,
    pub vote_message_id: String,
    pub reported_user_id: String,
    pub initiator_id: String,
    pub flags: EscalationFlags,
    pub voting_strategy: VotingStrategy,
    pub created_at: DateTime<Utc>,
    pub scheduled_for: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<Resolution>,
}

impl Escalation {
    pub fn quorum(&self) -> u32 {
        self.flags.quorum
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// Data needed to open a new escalation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEscalation {
    /// Stable id tied to the report, makes retried creation a no-op
    pub id: String,
    pub guild_id: String,
    pub thread_id: String,
    pub vote_message_id: String,
    pub reported_user_id: String,
    pub initiator_id: String,
    pub quorum: u32,
}

/// A single moderator's vote for one resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: String,
    pub escalation_id: String,
    pub voter_id: String,
    pub resolution: Resolution,
    pub voted_at: DateTime<Utc>,
}
