//! Platform gateway
//!
//! `PlatformGateway` is everything the engine needs from the chat platform:
//! member/user lookup, moderation actions and vote-message I/O.
//! `RestGateway` implements it over a Discord-compatible REST API.
//!
//! Lookups return `Ok(None)` on 404 so callers can tell "gone" apart from
//! "request failed".

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default timeout for REST requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Minimum spacing between REST requests (stays well under the global limit)
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(25);

/// Unreserved URI characters pass through audit-log reasons untouched
const REASON_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Buttons per action row allowed by the platform
const BUTTONS_PER_ROW: usize = 5;

const USER_AGENT: &str = concat!("modvote/", env!("CARGO_PKG_VERSION"));

/// Gateway errors
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// A guild member as seen by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub guild_id: String,
    pub user_id: String,
    pub display_name: String,
    pub roles: Vec<String>,
}

/// A platform account, independent of guild membership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformUser {
    pub id: String,
    pub username: String,
}

/// Moderation action applied to a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationAction {
    /// Communication timeout until the given instant
    Timeout { until: DateTime<Utc> },
    /// Add a role (the guild's restricted role)
    AssignRole { role_id: String },
    Kick,
    Ban { delete_message_seconds: u32 },
}

impl ModerationAction {
    pub fn name(&self) -> &'static str {
        match self {
            ModerationAction::Timeout { .. } => "timeout",
            ModerationAction::AssignRole { .. } => "assign_role",
            ModerationAction::Kick => "kick",
            ModerationAction::Ban { .. } => "ban",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

impl ButtonStyle {
    fn code(&self) -> u8 {
        match self {
            ButtonStyle::Primary => 1,
            ButtonStyle::Secondary => 2,
            ButtonStyle::Success => 3,
            ButtonStyle::Danger => 4,
        }
    }
}

/// Interactive button attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub custom_id: String,
    pub label: String,
    pub style: ButtonStyle,
    pub disabled: bool,
}

/// Message body to send or edit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub content: String,
    pub buttons: Vec<Button>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            buttons: Vec::new(),
        }
    }

    /// REST payload; buttons are packed into action rows
    pub fn to_payload(&self) -> Value {
        let rows: Vec<Value> = self
            .buttons
            .chunks(BUTTONS_PER_ROW)
            .map(|row| {
                let components: Vec<Value> = row
                    .iter()
                    .map(|b| {
                        json!({
                            "type": 2,
                            "style": b.style.code(),
                            "label": b.label,
                            "custom_id": b.custom_id,
                            "disabled": b.disabled,
                        })
                    })
                    .collect();
                json!({ "type": 1, "components": components })
            })
            .collect();

        json!({
            "content": self.content,
            "components": rows,
            "allowed_mentions": { "parse": [] },
        })
    }
}

#[async_trait]
pub trait PlatformGateway: Send + Sync {
    async fn fetch_member(&self, guild_id: &str, user_id: &str)
        -> Result<Option<Member>, GatewayError>;

    async fn fetch_user(&self, user_id: &str) -> Result<Option<PlatformUser>, GatewayError>;

    async fn apply_action(
        &self,
        guild_id: &str,
        user_id: &str,
        action: &ModerationAction,
        reason: &str,
    ) -> Result<(), GatewayError>;

    /// Returns the new message id
    async fn send_message(
        &self,
        channel_id: &str,
        message: &OutgoingMessage,
    ) -> Result<String, GatewayError>;

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        message: &OutgoingMessage,
    ) -> Result<(), GatewayError>;
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// One request per `interval`, no burst
fn request_quota(interval: Duration) -> Quota {
    Quota::with_period(interval).unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MemberPayload {
    user: UserPayload,
    #[serde(default)]
    nick: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    id: String,
}

/// Percent-encode an audit-log reason for use in a header
fn encode_reason(reason: &str) -> String {
    utf8_percent_encode(reason, REASON_ENCODE_SET).to_string()
}

/// REST client for a Discord-compatible API
pub struct RestGateway {
    http_client: reqwest::Client,
    base_url: String,
    token: String,
    rate_limiter: DirectRateLimiter,
}

impl RestGateway {
    pub fn new(base_url: &str, token: &str) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            rate_limiter: RateLimiter::direct(request_quota(MIN_REQUEST_INTERVAL)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, GatewayError> {
        self.rate_limiter.until_ready().await;

        request
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Api {
            status: status.as_u16(),
            body,
        })
    }

    /// GET returning `None` on 404
    async fn get_optional<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
    ) -> Result<Option<T>, GatewayError> {
        let response = self.send(self.http_client.get(self.url(path))).await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = Self::check(response).await?;
        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| GatewayError::Parse(e.to_string()))
    }
}

#[async_trait]
impl PlatformGateway for RestGateway {
    async fn fetch_member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<Member>, GatewayError> {
        let path = format!("/guilds/{}/members/{}", guild_id, user_id);
        let payload: Option<MemberPayload> = self.get_optional(&path).await?;

        Ok(payload.map(|m| Member {
            guild_id: guild_id.to_string(),
            display_name: m
                .nick
                .or(m.user.global_name)
                .unwrap_or_else(|| m.user.username.clone()),
            user_id: m.user.id,
            roles: m.roles,
        }))
    }

    async fn fetch_user(&self, user_id: &str) -> Result<Option<PlatformUser>, GatewayError> {
        let payload: Option<UserPayload> = self.get_optional(&format!("/users/{}", user_id)).await?;

        Ok(payload.map(|u| PlatformUser {
            id: u.id,
            username: u.username,
        }))
    }

    async fn apply_action(
        &self,
        guild_id: &str,
        user_id: &str,
        action: &ModerationAction,
        reason: &str,
    ) -> Result<(), GatewayError> {
        let member_path = format!("/guilds/{}/members/{}", guild_id, user_id);

        let request = match action {
            ModerationAction::Timeout { until } => self
                .http_client
                .patch(self.url(&member_path))
                .json(&json!({
                    "communication_disabled_until": until.to_rfc3339_opts(SecondsFormat::Secs, true)
                })),
            ModerationAction::AssignRole { role_id } => self
                .http_client
                .put(self.url(&format!("{}/roles/{}", member_path, role_id))),
            ModerationAction::Kick => self.http_client.delete(self.url(&member_path)),
            ModerationAction::Ban {
                delete_message_seconds,
            } => self
                .http_client
                .put(self.url(&format!("/guilds/{}/bans/{}", guild_id, user_id)))
                .json(&json!({ "delete_message_seconds": delete_message_seconds })),
        };

        let request = request.header("X-Audit-Log-Reason", encode_reason(reason));

        debug!(guild_id, user_id, action = action.name(), "Applying moderation action");
        let response = self.send(request).await?;
        Self::check(response).await?;

        Ok(())
    }

    async fn send_message(
        &self,
        channel_id: &str,
        message: &OutgoingMessage,
    ) -> Result<String, GatewayError> {
        let request = self
            .http_client
            .post(self.url(&format!("/channels/{}/messages", channel_id)))
            .json(&message.to_payload());

        let response = Self::check(self.send(request).await?).await?;
        let created: MessagePayload = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;

        Ok(created.id)
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        message: &OutgoingMessage,
    ) -> Result<(), GatewayError> {
        let request = self
            .http_client
            .patch(self.url(&format!("/channels/{}/messages/{}", channel_id, message_id)))
            .json(&message.to_payload());

        Self::check(self.send(request).await?).await?;
        Ok(())
    }
}
