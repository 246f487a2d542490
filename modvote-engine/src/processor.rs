//! Per-escalation resolution sequence
//!
//! Shared by the sweep, the quorum path of a vote and expedite:
//!
//! 1. load votes and tally them
//! 2. pick the target (no votes or a tie falls back to `track`)
//! 3. look up the reported member; if they are gone, resolve as `track`,
//!    otherwise execute the action and resolve only after it succeeds
//! 4. update the vote message and post notices (best-effort)

use modvote_common::events::{EscalationEvent, ResolutionTrigger};
use modvote_common::{Escalation, NewEscalation, Resolution};
use std::sync::Arc;
use tracing::{info, warn};

use crate::authority::Authority;
use crate::error::{EscalationError, Result};
use crate::executor::ResolutionExecutor;
use crate::gateway::{OutgoingMessage, PlatformGateway};
use crate::render;
use crate::service::EscalationService;
use crate::tally::Tally;

/// What started a resolution attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRequest {
    pub trigger: ResolutionTrigger,
    /// Pre-decided outcome (expedite passes the current leader)
    pub resolution: Option<Resolution>,
    /// Moderator credited in the notice
    pub actor: Option<String>,
}

impl ResolutionRequest {
    pub fn quorum() -> Self {
        Self {
            trigger: ResolutionTrigger::Quorum,
            resolution: None,
            actor: None,
        }
    }

    pub fn timeout() -> Self {
        Self {
            trigger: ResolutionTrigger::Timeout,
            resolution: None,
            actor: None,
        }
    }

    pub fn expedite(leader: Resolution, moderator_id: &str) -> Self {
        Self {
            trigger: ResolutionTrigger::Expedite,
            resolution: Some(leader),
            actor: Some(moderator_id.to_string()),
        }
    }
}

/// Outcome of a vote tally when nobody overrides it
pub fn decide(escalation_id: &str, tally: &Tally) -> Resolution {
    if tally.total_votes == 0 {
        return Resolution::Track;
    }

    if tally.is_tied {
        warn!(
            escalation_id,
            tied = ?tally.tied_resolutions,
            "Vote tied, falling back to track"
        );
        return Resolution::Track;
    }

    tally.leader.unwrap_or(Resolution::Track)
}

pub struct EscalationProcessor {
    service: EscalationService,
    executor: ResolutionExecutor,
    gateway: Arc<dyn PlatformGateway>,
    authority: Arc<dyn Authority>,
}

impl EscalationProcessor {
    pub fn new(
        service: EscalationService,
        executor: ResolutionExecutor,
        gateway: Arc<dyn PlatformGateway>,
        authority: Arc<dyn Authority>,
    ) -> Self {
        Self {
            service,
            executor,
            gateway,
            authority,
        }
    }

    pub fn service(&self) -> &EscalationService {
        &self.service
    }

    /// Create an escalation and turn its message into a live vote message
    pub async fn open(&self, data: NewEscalation) -> Result<Escalation> {
        let escalation = self.service.create(data).await?;
        let tally = self.service.tally_for(&escalation.id).await?;

        let message = render::render_vote_message(&escalation, &tally);
        if let Err(e) = self
            .gateway
            .edit_message(&escalation.thread_id, &escalation.vote_message_id, &message)
            .await
        {
            warn!(escalation_id = %escalation.id, error = %e, "Failed to render vote message");
        }

        Ok(escalation)
    }

    /// Drive one escalation to its terminal state
    ///
    /// Returns the resolved escalation. An execution failure leaves it open.
    pub async fn process(
        &self,
        escalation_id: &str,
        request: ResolutionRequest,
    ) -> Result<Escalation> {
        let escalation = self.service.get(escalation_id).await?;
        if let Some(resolved_at) = escalation.resolved_at {
            return Err(EscalationError::AlreadyResolved {
                escalation_id: escalation.id,
                resolved_at,
            });
        }

        let tally = self.service.tally_for(escalation_id).await?;
        let target = request
            .resolution
            .unwrap_or_else(|| decide(escalation_id, &tally));

        let member = self
            .gateway
            .fetch_member(&escalation.guild_id, &escalation.reported_user_id)
            .await
            .map_err(|e| EscalationError::ExternalApi {
                operation: "fetch_member".to_string(),
                cause: e.to_string(),
            })?;

        let Some(member) = member else {
            return self.resolve_member_gone(&escalation, &tally).await;
        };

        let guild = self.authority.guild_settings(&escalation.guild_id).await?;

        if let Err(e) = self
            .executor
            .execute(&escalation, target, &member, &guild, self.service.now())
            .await
        {
            self.service.events().emit_lossy(EscalationEvent::ActionFailed {
                escalation_id: escalation.id.clone(),
                resolution: target,
                error: e.to_string(),
                timestamp: self.service.now(),
            });
            return Err(e);
        }

        let resolved = self.service.resolve(escalation_id, target).await?;
        self.finish(&resolved, target, request.trigger, &tally, request.actor.as_deref(), None)
            .await;

        Ok(resolved)
    }

    async fn resolve_member_gone(&self, escalation: &Escalation, tally: &Tally) -> Result<Escalation> {
        let account_exists = match self.gateway.fetch_user(&escalation.reported_user_id).await {
            Ok(user) => user.is_some(),
            Err(e) => {
                warn!(escalation_id = %escalation.id, error = %e, "User lookup failed, assuming account exists");
                true
            }
        };

        info!(
            escalation_id = %escalation.id,
            reported_user_id = %escalation.reported_user_id,
            account_exists,
            "Reported member is gone, resolving as track"
        );

        let resolved = self.service.resolve(&escalation.id, Resolution::Track).await?;
        let notice = render::render_departed_notice(&resolved, account_exists);
        self.finish(
            &resolved,
            Resolution::Track,
            ResolutionTrigger::MemberGone,
            tally,
            None,
            Some(notice),
        )
        .await;

        Ok(resolved)
    }

    /// Step 4: nothing here can undo the resolution
    async fn finish(
        &self,
        resolved: &Escalation,
        resolution: Resolution,
        trigger: ResolutionTrigger,
        tally: &Tally,
        actor: Option<&str>,
        notice: Option<OutgoingMessage>,
    ) {
        let resolved_at = resolved.resolved_at.unwrap_or_else(|| self.service.now());

        self.service.events().emit_lossy(EscalationEvent::EscalationResolved {
            escalation_id: resolved.id.clone(),
            resolution,
            trigger,
            timestamp: resolved_at,
        });

        let vote_message = render::render_vote_message(resolved, tally);
        if let Err(e) = self
            .gateway
            .edit_message(&resolved.thread_id, &resolved.vote_message_id, &vote_message)
            .await
        {
            warn!(escalation_id = %resolved.id, error = %e, "Failed to update vote message");
        }

        let notice = notice.unwrap_or_else(|| {
            render::render_resolution_notice(resolved, resolution, trigger, tally, resolved_at, actor)
        });

        if let Err(e) = self.gateway.send_message(&resolved.thread_id, &notice).await {
            warn!(escalation_id = %resolved.id, error = %e, "Failed to post resolution notice");
        }

        self.forward_to_log_channel(resolved, &notice).await;
    }

    async fn forward_to_log_channel(&self, escalation: &Escalation, notice: &OutgoingMessage) {
        let log_channel = match self.authority.guild_settings(&escalation.guild_id).await {
            Ok(settings) => settings.log_channel_id,
            Err(e) => {
                warn!(escalation_id = %escalation.id, error = %e, "Could not load guild settings for log forwarding");
                None
            }
        };

        let Some(channel_id) = log_channel else {
            return;
        };

        if let Err(e) = self.gateway.send_message(&channel_id, notice).await {
            warn!(
                escalation_id = %escalation.id,
                channel_id = %channel_id,
                error = %e,
                "Failed to forward notice to log channel"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tally::tally;

    #[test]
    fn test_decide_no_votes_is_track() {
        assert_eq!(decide("e1", &tally(std::iter::empty())), Resolution::Track);
    }

    #[test]
    fn test_decide_tie_is_track() {
        let votes = tally([("a", Resolution::Ban), ("b", Resolution::Kick)]);
        assert_eq!(decide("e1", &votes), Resolution::Track);
    }

    #[test]
    fn test_decide_takes_leader() {
        let votes = tally([("a", Resolution::Ban), ("b", Resolution::Ban), ("c", Resolution::Kick)]);
        assert_eq!(decide("e1", &votes), Resolution::Ban);
    }

    #[test]
    fn test_expedite_request_carries_actor() {
        let request = ResolutionRequest::expedite(Resolution::Kick, "mod1");
        assert_eq!(request.trigger, ResolutionTrigger::Expedite);
        assert_eq!(request.resolution, Some(Resolution::Kick));
        assert_eq!(request.actor.as_deref(), Some("mod1"));
    }
}
