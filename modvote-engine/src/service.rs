//! Escalation service
//!
//! Orchestrates the escalation lifecycle on top of an [`EscalationStore`]:
//! create, toggle votes, upgrade strategy and resolve. Platform side effects
//! live in the processor; this layer only touches storage and the event bus.

use chrono::{DateTime, Utc};
use modvote_common::events::{EscalationEvent, EventBus};
use modvote_common::time::Clock;
use modvote_common::{Escalation, EscalationFlags, NewEscalation, Resolution, VotingStrategy};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{EscalationError, Result};
use crate::policy;
use crate::store::{EscalationStore, VoteToggle};
use crate::tally::Tally;

#[derive(Clone)]
pub struct EscalationService {
    store: Arc<dyn EscalationStore>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl EscalationService {
    pub fn new(store: Arc<dyn EscalationStore>, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self {
            store,
            clock,
            events,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Open an escalation, or return the existing one with the same id
    pub async fn create(&self, data: NewEscalation) -> Result<Escalation> {
        if data.quorum == 0 {
            return Err(EscalationError::InvalidInput("quorum must be at least 1".to_string()));
        }

        let now = self.clock.now();
        let escalation = Escalation {
            id: data.id,
            guild_id: data.guild_id,
            thread_id: data.thread_id,
            vote_message_id: data.vote_message_id,
            reported_user_id: data.reported_user_id,
            initiator_id: data.initiator_id,
            flags: EscalationFlags { quorum: data.quorum },
            voting_strategy: VotingStrategy::Simple,
            created_at: now,
            scheduled_for: policy::scheduled_for(now, 0),
            resolved_at: None,
            resolution: None,
        };

        let stored = self.store.insert_escalation(&escalation).await?;

        info!(
            escalation_id = %stored.id,
            guild_id = %stored.guild_id,
            reported_user_id = %stored.reported_user_id,
            quorum = stored.quorum(),
            "Escalation opened"
        );
        self.events.emit_lossy(EscalationEvent::EscalationCreated {
            escalation_id: stored.id.clone(),
            guild_id: stored.guild_id.clone(),
            reported_user_id: stored.reported_user_id.clone(),
            quorum: stored.quorum(),
            timestamp: now,
        });

        Ok(stored)
    }

    pub async fn get(&self, id: &str) -> Result<Escalation> {
        self.store
            .get_escalation(id)
            .await?
            .ok_or_else(|| EscalationError::not_found("escalation", id))
    }

    /// Current tally for an escalation
    pub async fn tally_for(&self, id: &str) -> Result<Tally> {
        let votes = self.store.list_votes(id).await?;
        Ok(Tally::from_records(&votes))
    }

    /// Cast or retract a vote, then pull the deadline in for the new voter count
    pub async fn record_vote(
        &self,
        escalation_id: &str,
        voter_id: &str,
        resolution: Resolution,
    ) -> Result<VoteToggle> {
        let escalation = self.get_open(escalation_id).await?;
        let now = self.clock.now();

        let toggle = self
            .store
            .toggle_vote(escalation_id, voter_id, resolution, now)
            .await?;

        let voters = self.store.count_distinct_voters(escalation_id).await?;
        let deadline = policy::scheduled_for(escalation.created_at, voters);
        self.store.tighten_schedule(escalation_id, deadline).await?;

        debug!(
            escalation_id,
            voter_id,
            %resolution,
            is_new = toggle.is_new,
            voters,
            "Vote toggled"
        );
        self.events.emit_lossy(EscalationEvent::VoteToggled {
            escalation_id: escalation_id.to_string(),
            voter_id: voter_id.to_string(),
            resolution,
            is_new: toggle.is_new,
            timestamp: now,
        });

        Ok(toggle)
    }

    /// Switch to majority voting; already-majority escalations are returned as-is
    pub async fn upgrade_strategy(&self, escalation_id: &str) -> Result<Escalation> {
        let escalation = self.get_open(escalation_id).await?;
        if escalation.voting_strategy == VotingStrategy::Majority {
            return Ok(escalation);
        }

        let voters = self.store.count_distinct_voters(escalation_id).await?;
        let deadline = policy::scheduled_for(escalation.created_at, voters);

        if !self
            .store
            .set_strategy(escalation_id, VotingStrategy::Majority, deadline)
            .await?
        {
            return Err(self.classify_failed_write(escalation_id).await);
        }

        info!(escalation_id, scheduled_for = %deadline, "Escalation upgraded to majority voting");
        self.events.emit_lossy(EscalationEvent::StrategyUpgraded {
            escalation_id: escalation_id.to_string(),
            strategy: VotingStrategy::Majority,
            scheduled_for: deadline,
            timestamp: self.clock.now(),
        });

        self.get(escalation_id).await
    }

    /// Terminal transition; exactly one caller wins for a given escalation
    pub async fn resolve(&self, escalation_id: &str, resolution: Resolution) -> Result<Escalation> {
        let now = self.clock.now();

        if self
            .store
            .resolve_if_open(escalation_id, resolution, now)
            .await?
        {
            info!(escalation_id, %resolution, "Escalation resolved");
            return self.get(escalation_id).await;
        }

        Err(self.classify_failed_write(escalation_id).await)
    }

    /// Open escalations whose deadline has passed, earliest first
    pub async fn due_escalations(&self) -> Result<Vec<Escalation>> {
        self.store.due_escalations(self.clock.now()).await
    }

    async fn get_open(&self, escalation_id: &str) -> Result<Escalation> {
        let escalation = self.get(escalation_id).await?;
        match escalation.resolved_at {
            Some(resolved_at) => Err(EscalationError::AlreadyResolved {
                escalation_id: escalation.id,
                resolved_at,
            }),
            None => Ok(escalation),
        }
    }

    /// Explain why a conditional write touched no rows
    async fn classify_failed_write(&self, escalation_id: &str) -> EscalationError {
        match self.store.get_escalation(escalation_id).await {
            Ok(None) => EscalationError::not_found("escalation", escalation_id),
            Ok(Some(Escalation {
                resolved_at: Some(resolved_at),
                ..
            })) => EscalationError::AlreadyResolved {
                escalation_id: escalation_id.to_string(),
                resolved_at,
            },
            Ok(Some(_)) => modvote_common::Error::Internal(format!(
                "conditional write on open escalation {} matched no rows",
                escalation_id
            ))
            .into(),
            Err(e) => e,
        }
    }
}
