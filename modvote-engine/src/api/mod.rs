//! HTTP API handlers for modvote-engine
//!
//! There is no authentication. Interaction bodies carry the clicking user's
//! id as relayed from the platform, and guild settings can be rewritten by
//! any caller, so the server binds to loopback by default and must only be
//! reachable by the relay that forwards platform events.

pub mod buildinfo;
pub mod error;
pub mod escalations;
pub mod guilds;
pub mod health;
pub mod interactions;
pub mod sweep;

pub use buildinfo::get_build_info;
pub use error::ApiError;
pub use escalations::{create_escalation, get_escalation};
pub use guilds::put_guild_settings;
pub use health::health_routes;
pub use interactions::post_interaction;
pub use sweep::post_sweep;
