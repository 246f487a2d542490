//! In-memory fakes for unit and integration tests
//!
//! `FakeGateway` records every call and serves members/users from maps, so
//! tests can assert on applied actions and rendered messages without a
//! platform connection.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use modvote_common::{Escalation, EscalationFlags, VotingStrategy};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;

use crate::gateway::{
    GatewayError, Member, ModerationAction, OutgoingMessage, PlatformGateway, PlatformUser,
};

/// A moderation action the fake was asked to apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAction {
    pub guild_id: String,
    pub user_id: String,
    pub action: ModerationAction,
    pub reason: String,
}

/// A message sent or edited through the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMessage {
    pub channel_id: String,
    pub message_id: String,
    pub message: OutgoingMessage,
}

#[derive(Default)]
struct FakeState {
    members: HashMap<(String, String), Member>,
    users: HashMap<String, PlatformUser>,
    actions: Vec<RecordedAction>,
    sent: Vec<RecordedMessage>,
    edits: Vec<RecordedMessage>,
    fail_actions: bool,
    fail_messages: bool,
    next_message_id: u64,
    action_gate: Option<Arc<Semaphore>>,
    waiting_actions: usize,
}

#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a guild member (and the matching platform user)
    pub fn add_member(&self, guild_id: &str, user_id: &str, roles: &[&str]) -> Member {
        let member = Member {
            guild_id: guild_id.to_string(),
            user_id: user_id.to_string(),
            display_name: user_id.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        };

        let mut state = self.state();
        state
            .members
            .insert((guild_id.to_string(), user_id.to_string()), member.clone());
        state.users.insert(
            user_id.to_string(),
            PlatformUser {
                id: user_id.to_string(),
                username: user_id.to_string(),
            },
        );
        member
    }

    /// Member left the guild; the account still exists
    pub fn remove_member(&self, guild_id: &str, user_id: &str) {
        self.state()
            .members
            .remove(&(guild_id.to_string(), user_id.to_string()));
    }

    /// Account deleted; gone from every guild too
    pub fn delete_user(&self, user_id: &str) {
        let mut state = self.state();
        state.users.remove(user_id);
        state.members.retain(|(_, uid), _| uid != user_id);
    }

    pub fn fail_actions(&self, fail: bool) {
        self.state().fail_actions = fail;
    }

    /// Park every `apply_action` call until `release_actions`
    pub fn hold_actions(&self) {
        self.state().action_gate = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_actions(&self) {
        if let Some(gate) = self.state().action_gate.take() {
            gate.close();
        }
    }

    /// Calls currently parked by `hold_actions`
    pub fn waiting_actions(&self) -> usize {
        self.state().waiting_actions
    }

    pub fn fail_messages(&self, fail: bool) {
        self.state().fail_messages = fail;
    }

    pub fn actions(&self) -> Vec<RecordedAction> {
        self.state().actions.clone()
    }

    pub fn sent_messages(&self) -> Vec<RecordedMessage> {
        self.state().sent.clone()
    }

    /// Most recent edit of a message, if any
    pub fn last_edit(&self, message_id: &str) -> Option<OutgoingMessage> {
        self.state()
            .edits
            .iter()
            .rev()
            .find(|m| m.message_id == message_id)
            .map(|m| m.message.clone())
    }
}

#[async_trait]
impl PlatformGateway for FakeGateway {
    async fn fetch_member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<Member>, GatewayError> {
        Ok(self
            .state()
            .members
            .get(&(guild_id.to_string(), user_id.to_string()))
            .cloned())
    }

    async fn fetch_user(&self, user_id: &str) -> Result<Option<PlatformUser>, GatewayError> {
        Ok(self.state().users.get(user_id).cloned())
    }

    async fn apply_action(
        &self,
        guild_id: &str,
        user_id: &str,
        action: &ModerationAction,
        reason: &str,
    ) -> Result<(), GatewayError> {
        let gate = self.state().action_gate.clone();
        if let Some(gate) = gate {
            self.state().waiting_actions += 1;
            // Closing the semaphore wakes every waiter with an error
            let _ = gate.acquire().await;
            self.state().waiting_actions -= 1;
        }

        let mut state = self.state();
        if state.fail_actions {
            return Err(GatewayError::Api {
                status: 403,
                body: "Missing Permissions".to_string(),
            });
        }

        state.actions.push(RecordedAction {
            guild_id: guild_id.to_string(),
            user_id: user_id.to_string(),
            action: action.clone(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn send_message(
        &self,
        channel_id: &str,
        message: &OutgoingMessage,
    ) -> Result<String, GatewayError> {
        let mut state = self.state();
        if state.fail_messages {
            return Err(GatewayError::Network("connection reset".to_string()));
        }

        state.next_message_id += 1;
        let message_id = format!("msg-{}", state.next_message_id);
        state.sent.push(RecordedMessage {
            channel_id: channel_id.to_string(),
            message_id: message_id.clone(),
            message: message.clone(),
        });
        Ok(message_id)
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        message: &OutgoingMessage,
    ) -> Result<(), GatewayError> {
        let mut state = self.state();
        if state.fail_messages {
            return Err(GatewayError::Network("connection reset".to_string()));
        }

        state.edits.push(RecordedMessage {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            message: message.clone(),
        });
        Ok(())
    }
}

/// Open simple-strategy escalation in guild `g1` against user `reported`
pub fn sample_escalation(id: &str, created_at: DateTime<Utc>) -> Escalation {
    Escalation {
        id: id.to_string(),
        guild_id: "g1".to_string(),
        thread_id: "thread".to_string(),
        vote_message_id: "vote-msg".to_string(),
        reported_user_id: "reported".to_string(),
        initiator_id: "initiator".to_string(),
        flags: EscalationFlags { quorum: 3 },
        voting_strategy: VotingStrategy::Simple,
        created_at,
        scheduled_for: created_at + Duration::hours(24),
        resolved_at: None,
        resolution: None,
    }
}
