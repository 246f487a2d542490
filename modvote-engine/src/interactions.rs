//! Button interactions
//!
//! Vote-message buttons carry a `|`-separated command identifier:
//!
//! - `vote|<escalation_id>|<resolution>`
//! - `expedite|<escalation_id>`
//! - `escalate|<escalation_id>|<level>` (level 1 switches to majority voting)
//!
//! Every command requires the moderator role in the escalation's guild.

use modvote_common::{Escalation, Resolution, VotingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::authority::Authority;
use crate::error::{EscalationError, NoLeaderReason, Result};
use crate::gateway::{OutgoingMessage, PlatformGateway};
use crate::policy;
use crate::processor::{EscalationProcessor, ResolutionRequest};
use crate::render;

const SEPARATOR: char = '|';

/// Strategy level that switches an escalation to majority voting
pub const MAJORITY_LEVEL: u8 = 1;

/// Decoded button command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandId {
    Vote {
        escalation_id: String,
        resolution: Resolution,
    },
    Expedite {
        escalation_id: String,
    },
    Escalate {
        escalation_id: String,
        level: u8,
    },
}

impl CommandId {
    pub fn parse(custom_id: &str) -> Result<Self> {
        let invalid = |why: &str| EscalationError::InvalidInput(format!("{}: '{}'", why, custom_id));

        let parts: Vec<&str> = custom_id.split(SEPARATOR).collect();
        let escalation_id = match parts.get(1) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Err(invalid("missing escalation id")),
        };

        match (parts[0], parts.len()) {
            ("vote", 3) => Ok(CommandId::Vote {
                escalation_id,
                resolution: parts[2].parse::<Resolution>()?,
            }),
            ("expedite", 2) => Ok(CommandId::Expedite { escalation_id }),
            ("escalate", 3) => {
                let level: u8 = parts[2].parse().map_err(|_| invalid("bad escalation level"))?;
                if level != MAJORITY_LEVEL {
                    return Err(invalid("unsupported escalation level"));
                }
                Ok(CommandId::Escalate {
                    escalation_id,
                    level,
                })
            }
            _ => Err(invalid("unknown command")),
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn escalation_id(&self) -> &str {
        match self {
            CommandId::Vote { escalation_id, .. }
            | CommandId::Expedite { escalation_id }
            | CommandId::Escalate { escalation_id, .. } => escalation_id,
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            CommandId::Vote { .. } => "vote",
            CommandId::Expedite { .. } => "expedite",
            CommandId::Escalate { .. } => "escalate",
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandId::Vote {
                escalation_id,
                resolution,
            } => write!(f, "vote|{}|{}", escalation_id, resolution),
            CommandId::Expedite { escalation_id } => write!(f, "expedite|{}", escalation_id),
            CommandId::Escalate {
                escalation_id,
                level,
            } => write!(f, "escalate|{}|{}", escalation_id, level),
        }
    }
}

/// A button click
#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    pub custom_id: String,
    pub guild_id: String,
    pub user_id: String,
}

/// Ephemeral reply shown to the clicking moderator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionReply {
    pub content: String,
}

impl InteractionReply {
    fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

pub struct InteractionHandler {
    processor: Arc<EscalationProcessor>,
    authority: Arc<dyn Authority>,
    gateway: Arc<dyn PlatformGateway>,
}

impl InteractionHandler {
    pub fn new(
        processor: Arc<EscalationProcessor>,
        authority: Arc<dyn Authority>,
        gateway: Arc<dyn PlatformGateway>,
    ) -> Self {
        Self {
            processor,
            authority,
            gateway,
        }
    }

    pub async fn handle(&self, interaction: &Interaction) -> Result<InteractionReply> {
        let command = CommandId::parse(&interaction.custom_id)?;
        let escalation = self
            .processor
            .service()
            .get(command.escalation_id())
            .await?;

        // Escalations are only addressable from their own guild
        if escalation.guild_id != interaction.guild_id {
            return Err(EscalationError::not_found("escalation", &escalation.id));
        }

        if !self
            .authority
            .is_moderator(&escalation.guild_id, &interaction.user_id)
            .await?
        {
            return Err(EscalationError::NotAuthorized {
                operation: command.operation().to_string(),
                user_id: interaction.user_id.clone(),
                required_role: "moderator".to_string(),
            });
        }

        if let Some(resolved_at) = escalation.resolved_at {
            return Err(EscalationError::AlreadyResolved {
                escalation_id: escalation.id,
                resolved_at,
            });
        }

        match command {
            CommandId::Vote { resolution, .. } => {
                self.vote(&escalation, &interaction.user_id, resolution).await
            }
            CommandId::Expedite { .. } => self.expedite(&escalation, &interaction.user_id).await,
            CommandId::Escalate { .. } => self.escalate(&escalation).await,
        }
    }

    async fn vote(
        &self,
        escalation: &Escalation,
        voter_id: &str,
        resolution: Resolution,
    ) -> Result<InteractionReply> {
        let service = self.processor.service();
        let toggle = service.record_vote(&escalation.id, voter_id, resolution).await?;

        let verb = if toggle.is_new { "recorded" } else { "removed" };
        let ack = format!("Vote {} for {}", verb, resolution);

        let escalation = service.get(&escalation.id).await?;
        let tally = service.tally_for(&escalation.id).await?;

        if !policy::should_trigger_early(&tally, escalation.quorum(), escalation.voting_strategy) {
            self.refresh(&escalation, &render::render_vote_message(&escalation, &tally))
                .await;
            return Ok(InteractionReply::new(ack));
        }

        if tally.is_tied {
            info!(
                escalation_id = %escalation.id,
                tied = ?tally.tied_resolutions,
                "Quorum reached on a tie, waiting for tiebreak"
            );
            self.refresh(&escalation, &render::render_tiebreaker(&escalation, &tally))
                .await;
            return Ok(InteractionReply::new(format!(
                "{}. Quorum reached but the vote is tied.",
                ack
            )));
        }

        match self
            .processor
            .process(&escalation.id, ResolutionRequest::quorum())
            .await
        {
            Ok(resolved) => Ok(InteractionReply::new(format!(
                "{}. Quorum reached, resolved as {}.",
                ack,
                resolved.resolution.map_or("track", |r| r.as_str())
            ))),
            Err(EscalationError::AlreadyResolved { .. }) => Ok(InteractionReply::new(ack)),
            Err(e) => {
                warn!(escalation_id = %escalation.id, error = %e, "Quorum resolution failed");
                Ok(InteractionReply::new(format!(
                    "{}. Quorum reached but the action failed; it will be retried.",
                    ack
                )))
            }
        }
    }

    async fn expedite(&self, escalation: &Escalation, moderator_id: &str) -> Result<InteractionReply> {
        let tally = self.processor.service().tally_for(&escalation.id).await?;

        let leader = match tally.leader {
            Some(leader) if !tally.is_tied => leader,
            _ => {
                let reason = if tally.total_votes == 0 {
                    NoLeaderReason::NoVotes
                } else {
                    NoLeaderReason::Tied
                };
                return Err(EscalationError::NoLeader {
                    escalation_id: escalation.id.clone(),
                    reason,
                    tied_resolutions: tally.tied_resolutions,
                });
            }
        };

        info!(escalation_id = %escalation.id, moderator_id, %leader, "Expediting escalation");

        let resolved = self
            .processor
            .process(&escalation.id, ResolutionRequest::expedite(leader, moderator_id))
            .await?;

        Ok(InteractionReply::new(format!(
            "Expedited: resolved as {}.",
            resolved.resolution.map_or("track", |r| r.as_str())
        )))
    }

    async fn escalate(&self, escalation: &Escalation) -> Result<InteractionReply> {
        if escalation.voting_strategy == VotingStrategy::Majority {
            return Ok(InteractionReply::new("Already using majority voting."));
        }

        let service = self.processor.service();
        let upgraded = service.upgrade_strategy(&escalation.id).await?;
        let tally = service.tally_for(&upgraded.id).await?;

        self.refresh(&upgraded, &render::render_vote_message(&upgraded, &tally))
            .await;

        Ok(InteractionReply::new(format!(
            "Switched to majority voting. Resolves <t:{}:R>.",
            upgraded.scheduled_for.timestamp()
        )))
    }

    /// Best-effort vote message update
    async fn refresh(&self, escalation: &Escalation, message: &OutgoingMessage) {
        if let Err(e) = self
            .gateway
            .edit_message(&escalation.thread_id, &escalation.vote_message_id, message)
            .await
        {
            warn!(escalation_id = %escalation.id, error = %e, "Failed to update vote message");
        }
    }
}
