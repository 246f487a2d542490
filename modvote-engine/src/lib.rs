//! modvote-engine library - escalation voting and auto-resolution
//!
//! Moderators vote on outcomes for a reported user; escalations resolve on
//! quorum, on an expedite override, or automatically once their deadline
//! passes.

use axum::Router;
use modvote_common::db::settings::RuntimeSettings;
use modvote_common::events::EventBus;
use modvote_common::time::Clock;
use sqlx::SqlitePool;
use std::sync::Arc;

pub mod api;
pub mod authority;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod interactions;
pub mod policy;
pub mod processor;
pub mod render;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod tally;
pub mod testing;

pub use error::{EscalationError, Result};

use authority::{Authority, GuildAuthority, GuildSettingsCache};
use executor::ResolutionExecutor;
use gateway::PlatformGateway;
use interactions::InteractionHandler;
use processor::EscalationProcessor;
use scheduler::AutoResolutionScheduler;
use service::EscalationService;
use store::SqliteEscalationStore;

/// Buffered escalation events before slow subscribers lag
const EVENT_BUS_CAPACITY: usize = 256;

/// Application state shared across HTTP handlers and the scheduler
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: EventBus,
    pub settings_cache: Arc<GuildSettingsCache>,
    pub authority: Arc<dyn Authority>,
    pub processor: Arc<EscalationProcessor>,
    pub interactions: Arc<InteractionHandler>,
    pub scheduler: Arc<AutoResolutionScheduler>,
}

impl AppState {
    /// Wire the engine components over one pool and gateway
    pub fn new(
        db: SqlitePool,
        gateway: Arc<dyn PlatformGateway>,
        clock: Arc<dyn Clock>,
        settings: &RuntimeSettings,
    ) -> Self {
        let events = EventBus::new(EVENT_BUS_CAPACITY);

        let settings_cache = Arc::new(GuildSettingsCache::new(db.clone(), settings.default_quorum));
        let authority: Arc<dyn Authority> =
            Arc::new(GuildAuthority::new(settings_cache.clone(), gateway.clone()));

        let service = EscalationService::new(
            Arc::new(SqliteEscalationStore::new(db.clone())),
            clock,
            events.clone(),
        );
        let executor = ResolutionExecutor::new(gateway.clone(), settings);
        let processor = Arc::new(EscalationProcessor::new(
            service,
            executor,
            gateway.clone(),
            authority.clone(),
        ));

        let interactions = Arc::new(InteractionHandler::new(
            processor.clone(),
            authority.clone(),
            gateway,
        ));
        let scheduler = Arc::new(AutoResolutionScheduler::new(processor.clone()));

        Self {
            db,
            events,
            settings_cache,
            authority,
            processor,
            interactions,
            scheduler,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post, put};
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/api/buildinfo", get(api::get_build_info))
        .route("/api/escalations", post(api::create_escalation))
        .route("/api/escalations/:id", get(api::get_escalation))
        .route("/api/interactions", post(api::post_interaction))
        .route("/api/guilds/:guild_id/settings", put(api::put_guild_settings))
        .route("/api/sweep", post(api::post_sweep))
        .merge(api::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
