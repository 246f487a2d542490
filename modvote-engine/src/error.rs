//! Error types for modvote-engine
//!
//! One closed enum covers the escalation error taxonomy plus wrappers for
//! storage and common-crate failures.

use chrono::{DateTime, Utc};
use modvote_common::Resolution;
use std::fmt;
use thiserror::Error;

/// Why expedite could not pick a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoLeaderReason {
    NoVotes,
    Tied,
}

impl NoLeaderReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoLeaderReason::NoVotes => "no_votes",
            NoLeaderReason::Tied => "tied",
        }
    }
}

impl fmt::Display for NoLeaderReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for modvote-engine
#[derive(Error, Debug)]
pub enum EscalationError {
    /// Caller lacks the role required for the operation
    #[error("User {user_id} is not authorized to {operation} (requires {required_role})")]
    NotAuthorized {
        operation: String,
        user_id: String,
        required_role: String,
    },

    #[error("{resource} not found: {id}")]
    NotFound { id: String, resource: String },

    /// Escalation is terminal
    #[error("Escalation {escalation_id} was already resolved at {resolved_at}")]
    AlreadyResolved {
        escalation_id: String,
        resolved_at: DateTime<Utc>,
    },

    /// Expedite needs a decisive leader
    #[error("Escalation {escalation_id} has no leader ({reason})")]
    NoLeader {
        escalation_id: String,
        reason: NoLeaderReason,
        tied_resolutions: Vec<Resolution>,
    },

    /// Platform call failed
    #[error("External API error during {operation}: {cause}")]
    ExternalApi { operation: String, cause: String },

    /// Moderation action for a resolution failed; escalation left open
    #[error("Failed to execute {resolution} for escalation {escalation_id}: {cause}")]
    ResolutionExecution {
        escalation_id: String,
        resolution: Resolution,
        cause: String,
    },

    /// Malformed command identifier or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Common(#[from] modvote_common::Error),
}

impl EscalationError {
    pub fn not_found(resource: &str, id: &str) -> Self {
        EscalationError::NotFound {
            id: id.to_string(),
            resource: resource.to_string(),
        }
    }

    /// Short machine-readable kind, used in HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            EscalationError::NotAuthorized { .. } => "not_authorized",
            EscalationError::NotFound { .. } => "not_found",
            EscalationError::AlreadyResolved { .. } => "already_resolved",
            EscalationError::NoLeader { .. } => "no_leader",
            EscalationError::ExternalApi { .. } => "external_api",
            EscalationError::ResolutionExecution { .. } => "resolution_execution",
            EscalationError::InvalidInput(_) => "invalid_input",
            EscalationError::Database(_) => "database",
            EscalationError::Common(modvote_common::Error::InvalidInput(_)) => "invalid_input",
            EscalationError::Common(_) => "internal",
        }
    }

    /// Text shown to the moderator who triggered the interaction
    pub fn user_message(&self) -> String {
        match self {
            EscalationError::NotAuthorized { operation, .. } => {
                format!("You need the moderator role to {}.", operation)
            }
            EscalationError::NotFound { resource, .. } => {
                format!("That {} no longer exists.", resource)
            }
            EscalationError::AlreadyResolved { resolved_at, .. } => format!(
                "This escalation was already resolved <t:{}:R>.",
                resolved_at.timestamp()
            ),
            EscalationError::NoLeader {
                reason: NoLeaderReason::NoVotes,
                ..
            } => "Cannot expedite: nobody has voted yet.".to_string(),
            EscalationError::NoLeader {
                tied_resolutions, ..
            } => {
                let tied: Vec<&str> = tied_resolutions.iter().map(|r| r.label()).collect();
                format!("Cannot expedite: the vote is tied between {}.", tied.join(", "))
            }
            EscalationError::InvalidInput(msg) => format!("Invalid request: {}", msg),
            EscalationError::Common(modvote_common::Error::InvalidInput(msg)) => {
                format!("Invalid request: {}", msg)
            }
            _ => "Something went wrong handling that action. It has been logged.".to_string(),
        }
    }
}

/// Convenience Result type using EscalationError
pub type Result<T> = std::result::Result<T, EscalationError>;
