//! Shared setup for modvote-engine integration tests
//!
//! Guild `g1` has moderators m1..m4 (role `mods`), a restricted role, a log
//! channel, and quorum 3. The reported user and a bystander are plain members.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use modvote_common::db::init_memory_database;
use modvote_common::db::settings::RuntimeSettings;
use modvote_common::time::ManualClock;
use modvote_common::{Escalation, NewEscalation};
use modvote_engine::authority::{upsert_guild_settings, GuildSettings};
use modvote_engine::interactions::{Interaction, InteractionReply};
use modvote_engine::scheduler::SweepReport;
use modvote_engine::testing::FakeGateway;
use modvote_engine::{AppState, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const GUILD: &str = "g1";
pub const THREAD: &str = "thread";
pub const VOTE_MESSAGE: &str = "vote-msg";
pub const LOG_CHANNEL: &str = "mod-log";
pub const REPORTED: &str = "reported";

pub struct Harness {
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    pub clock: Arc<ManualClock>,
}

pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub async fn setup() -> Harness {
    let pool = init_memory_database().await.unwrap();

    upsert_guild_settings(
        &pool,
        &GuildSettings {
            guild_id: GUILD.to_string(),
            quorum: 3,
            moderator_role_ids: vec!["mods".to_string()],
            restricted_role_id: Some("jail".to_string()),
            log_channel_id: Some(LOG_CHANNEL.to_string()),
        },
    )
    .await
    .unwrap();

    let gateway = Arc::new(FakeGateway::new());
    for moderator in ["m1", "m2", "m3", "m4"] {
        gateway.add_member(GUILD, moderator, &["mods"]);
    }
    gateway.add_member(GUILD, REPORTED, &[]);
    gateway.add_member(GUILD, "bystander", &[]);

    let clock = Arc::new(ManualClock::new(t0()));
    let state = AppState::new(pool, gateway.clone(), clock.clone(), &RuntimeSettings::default());

    Harness {
        state,
        gateway,
        clock,
    }
}

impl Harness {
    pub async fn open(&self, id: &str, quorum: u32) -> Escalation {
        self.state
            .processor
            .open(NewEscalation {
                id: id.to_string(),
                guild_id: GUILD.to_string(),
                thread_id: THREAD.to_string(),
                vote_message_id: VOTE_MESSAGE.to_string(),
                reported_user_id: REPORTED.to_string(),
                initiator_id: "m1".to_string(),
                quorum,
            })
            .await
            .unwrap()
    }

    pub async fn click(&self, custom_id: &str, user_id: &str) -> Result<InteractionReply> {
        self.state
            .interactions
            .handle(&Interaction {
                custom_id: custom_id.to_string(),
                guild_id: GUILD.to_string(),
                user_id: user_id.to_string(),
            })
            .await
    }

    pub async fn escalation(&self, id: &str) -> Escalation {
        self.state.processor.service().get(id).await.unwrap()
    }

    /// Contents of every message posted to a channel
    pub fn posted_to(&self, channel_id: &str) -> Vec<String> {
        self.gateway
            .sent_messages()
            .into_iter()
            .filter(|m| m.channel_id == channel_id)
            .map(|m| m.message.content)
            .collect()
    }

    /// Start a sweep in the background and wait until it is parked inside
    /// its first moderation action. Call `gateway.release_actions()` to let
    /// it finish.
    pub async fn start_held_sweep(&self) -> JoinHandle<Result<Option<SweepReport>>> {
        self.gateway.hold_actions();

        let scheduler = self.state.scheduler.clone();
        let sweep = tokio::spawn(async move { scheduler.try_sweep().await });

        while self.gateway.waiting_actions() == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        sweep
    }
}
