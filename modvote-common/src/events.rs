//! Event types for the modvote event system
//!
//! Provides escalation lifecycle events and the EventBus used to fan them
//! out to interested components (log forwarding, SSE, tests).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{Resolution, VotingStrategy};

/// What caused an escalation to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTrigger {
    /// Leading option reached quorum under the simple strategy
    Quorum,
    /// Deadline passed, resolved by the periodic sweep
    Timeout,
    /// A moderator forced resolution with the current leader
    Expedite,
    /// Reported member could no longer be found on the platform
    MemberGone,
}

impl ResolutionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionTrigger::Quorum => "quorum",
            ResolutionTrigger::Timeout => "timeout",
            ResolutionTrigger::Expedite => "expedite",
            ResolutionTrigger::MemberGone => "member_gone",
        }
    }
}

/// Escalation lifecycle events
///
/// Events are broadcast via EventBus and serialize with a `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EscalationEvent {
    /// A new escalation was opened (or an idempotent retry found the existing one)
    EscalationCreated {
        escalation_id: String,
        guild_id: String,
        reported_user_id: String,
        quorum: u32,
        timestamp: DateTime<Utc>,
    },

    /// A vote was cast or retracted
    VoteToggled {
        escalation_id: String,
        voter_id: String,
        resolution: Resolution,
        /// true when the vote was added, false when it was retracted
        is_new: bool,
        timestamp: DateTime<Utc>,
    },

    /// Strategy changed (only ever simple -> majority)
    StrategyUpgraded {
        escalation_id: String,
        strategy: VotingStrategy,
        scheduled_for: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// Escalation reached its terminal state
    EscalationResolved {
        escalation_id: String,
        resolution: Resolution,
        trigger: ResolutionTrigger,
        timestamp: DateTime<Utc>,
    },

    /// Moderation action failed; escalation stays open for the next sweep
    ActionFailed {
        escalation_id: String,
        resolution: Resolution,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A sweep pass finished
    SweepCompleted {
        processed: usize,
        succeeded: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },
}

impl EscalationEvent {
    /// Event type name as it appears in the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            EscalationEvent::EscalationCreated { .. } => "EscalationCreated",
            EscalationEvent::VoteToggled { .. } => "VoteToggled",
            EscalationEvent::StrategyUpgraded { .. } => "StrategyUpgraded",
            EscalationEvent::EscalationResolved { .. } => "EscalationResolved",
            EscalationEvent::ActionFailed { .. } => "ActionFailed",
            EscalationEvent::SweepCompleted { .. } => "SweepCompleted",
        }
    }
}

/// Broadcast bus for escalation events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EscalationEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before slow subscribers
    /// start missing old events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EscalationEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: EscalationEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_ignored() {
        let bus = EventBus::new(10);
        bus.emit_lossy(EscalationEvent::SweepCompleted {
            processed: 0,
            succeeded: 0,
            failed: 0,
            timestamp: Utc::now(),
        });

        // Late subscribers only see events emitted after they joined
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit_lossy(EscalationEvent::EscalationResolved {
            escalation_id: "esc-1".to_string(),
            resolution: Resolution::Ban,
            trigger: ResolutionTrigger::Quorum,
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            EscalationEvent::EscalationResolved {
                escalation_id,
                resolution,
                trigger,
                ..
            } => {
                assert_eq!(escalation_id, "esc-1");
                assert_eq!(resolution, Resolution::Ban);
                assert_eq!(trigger, ResolutionTrigger::Quorum);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_serialized_type_tag() {
        let event = EscalationEvent::VoteToggled {
            escalation_id: "esc-1".to_string(),
            voter_id: "42".to_string(),
            resolution: Resolution::Kick,
            is_new: true,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["resolution"], "kick");
    }
}
