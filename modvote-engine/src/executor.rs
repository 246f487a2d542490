//! Resolution executor
//!
//! Turns a resolution into a platform moderation action. `track` never
//! touches the member.

use chrono::{DateTime, Duration, Utc};
use modvote_common::db::settings::RuntimeSettings;
use modvote_common::{Escalation, Resolution};
use std::sync::Arc;
use tracing::{info, warn};

use crate::authority::GuildSettings;
use crate::error::{EscalationError, Result};
use crate::gateway::{Member, ModerationAction, PlatformGateway};

/// Audit-log reason attached to every action
pub const RESOLUTION_REASON: &str = "Escalation resolved by moderator vote";

pub struct ResolutionExecutor {
    gateway: Arc<dyn PlatformGateway>,
    timeout_duration_hours: u32,
    ban_delete_message_seconds: u32,
}

impl ResolutionExecutor {
    pub fn new(gateway: Arc<dyn PlatformGateway>, settings: &RuntimeSettings) -> Self {
        Self {
            gateway,
            timeout_duration_hours: settings.timeout_duration_hours,
            ban_delete_message_seconds: settings.ban_delete_message_seconds,
        }
    }

    /// Action for a resolution, `None` for `track`
    pub fn action_for(
        &self,
        escalation: &Escalation,
        resolution: Resolution,
        guild: &GuildSettings,
        now: DateTime<Utc>,
    ) -> Result<Option<ModerationAction>> {
        let action = match resolution {
            Resolution::Track => return Ok(None),
            Resolution::Timeout => ModerationAction::Timeout {
                until: now + Duration::hours(i64::from(self.timeout_duration_hours)),
            },
            Resolution::Restrict => {
                let role_id = guild.restricted_role_id.clone().ok_or_else(|| {
                    EscalationError::ResolutionExecution {
                        escalation_id: escalation.id.clone(),
                        resolution,
                        cause: format!("guild {} has no restricted role configured", guild.guild_id),
                    }
                })?;
                ModerationAction::AssignRole { role_id }
            }
            Resolution::Kick => ModerationAction::Kick,
            Resolution::Ban => ModerationAction::Ban {
                delete_message_seconds: self.ban_delete_message_seconds,
            },
        };

        Ok(Some(action))
    }

    /// Apply `resolution` to an already-fetched member
    pub async fn execute(
        &self,
        escalation: &Escalation,
        resolution: Resolution,
        member: &Member,
        guild: &GuildSettings,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(action) = self.action_for(escalation, resolution, guild, now)? else {
            info!(escalation_id = %escalation.id, "Track resolution, no action taken");
            return Ok(());
        };

        self.gateway
            .apply_action(&member.guild_id, &member.user_id, &action, RESOLUTION_REASON)
            .await
            .map_err(|e| {
                warn!(
                    escalation_id = %escalation.id,
                    %resolution,
                    error = %e,
                    "Moderation action failed"
                );
                EscalationError::ResolutionExecution {
                    escalation_id: escalation.id.clone(),
                    resolution,
                    cause: e.to_string(),
                }
            })?;

        info!(
            escalation_id = %escalation.id,
            user_id = %member.user_id,
            action = action.name(),
            "Applied moderation action"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_escalation, FakeGateway};

    fn executor(gateway: Arc<FakeGateway>) -> ResolutionExecutor {
        let settings = RuntimeSettings {
            timeout_duration_hours: 12,
            ban_delete_message_seconds: 60,
            ..RuntimeSettings::default()
        };
        ResolutionExecutor::new(gateway, &settings)
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[tokio::test]
    async fn test_track_is_noop() {
        let gateway = Arc::new(FakeGateway::new());
        let member = gateway.add_member("g1", "reported", &[]);
        let esc = sample_escalation("e1", t0());

        executor(gateway.clone())
            .execute(&esc, Resolution::Track, &member, &GuildSettings::defaults("g1", 3), t0())
            .await
            .unwrap();

        assert!(gateway.actions().is_empty());
    }

    #[tokio::test]
    async fn test_ban_uses_fixed_reason_and_delete_window() {
        let gateway = Arc::new(FakeGateway::new());
        let member = gateway.add_member("g1", "reported", &[]);
        let esc = sample_escalation("e1", t0());

        executor(gateway.clone())
            .execute(&esc, Resolution::Ban, &member, &GuildSettings::defaults("g1", 3), t0())
            .await
            .unwrap();

        let actions = gateway.actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].user_id, "reported");
        assert_eq!(actions[0].action, ModerationAction::Ban { delete_message_seconds: 60 });
        assert_eq!(actions[0].reason, RESOLUTION_REASON);
    }

    #[tokio::test]
    async fn test_timeout_duration_from_settings() {
        let gateway = Arc::new(FakeGateway::new());
        let esc = sample_escalation("e1", t0());
        let action = executor(gateway)
            .action_for(&esc, Resolution::Timeout, &GuildSettings::defaults("g1", 3), t0())
            .unwrap();

        assert_eq!(action, Some(ModerationAction::Timeout { until: t0() + Duration::hours(12) }));
    }

    #[tokio::test]
    async fn test_restrict_without_role_fails() {
        let gateway = Arc::new(FakeGateway::new());
        let esc = sample_escalation("e1", t0());

        let err = executor(gateway)
            .action_for(&esc, Resolution::Restrict, &GuildSettings::defaults("g1", 3), t0())
            .unwrap_err();

        assert_eq!(err.kind(), "resolution_execution");
    }

    #[tokio::test]
    async fn test_gateway_failure_maps_to_execution_error() {
        let gateway = Arc::new(FakeGateway::new());
        let member = gateway.add_member("g1", "reported", &[]);
        gateway.fail_actions(true);
        let esc = sample_escalation("e1", t0());

        let err = executor(gateway)
            .execute(&esc, Resolution::Kick, &member, &GuildSettings::defaults("g1", 3), t0())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EscalationError::ResolutionExecution { resolution: Resolution::Kick, .. }
        ));
    }
}
