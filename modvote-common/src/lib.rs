//! # modvote Common Library
//!
//! Shared code for the modvote escalation services including:
//! - Domain types (Resolution, VotingStrategy, Escalation, VoteRecord)
//! - Database initialization, migrations and settings access
//! - Event types (EscalationEvent) and the EventBus
//! - Configuration loading
//! - Clock and human-readable time helpers

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod human_time;
pub mod time;
pub mod types;

pub use error::{Error, Result};
pub use types::{Escalation, EscalationFlags, NewEscalation, Resolution, VoteRecord, VotingStrategy};
