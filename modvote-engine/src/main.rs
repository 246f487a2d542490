//! modvote-engine - escalation voting service entry point
//!
//! Startup order: CLI args, TOML bootstrap config, tracing, database and
//! runtime settings, platform client, sweep timer, HTTP server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use modvote_common::config::{read_bot_token, TomlConfig};
use modvote_common::db::{init_database, settings::load_runtime_settings};
use modvote_common::time::SystemClock;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modvote_engine::gateway::RestGateway;
use modvote_engine::{build_router, AppState};

/// Command-line arguments for modvote-engine
#[derive(Parser, Debug)]
#[command(name = "modvote-engine")]
#[command(about = "Escalation voting and auto-resolution service")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "MODVOTE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "MODVOTE_PORT")]
    port: Option<u16>,

    /// SQLite database file (overrides config)
    #[arg(short, long, env = "MODVOTE_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Loaded before tracing exists so the configured level can seed the filter
    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    let level = &config.logging.level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("modvote_engine={level},modvote_common={level},tower_http={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting modvote-engine v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let db_path = args.database.unwrap_or_else(|| config.database_path());
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let mut settings = load_runtime_settings(&pool)
        .await
        .context("Failed to load runtime settings")?;
    if let Some(interval) = config.sweep_interval_secs {
        settings.sweep_interval_secs = interval.max(1);
    }
    info!(
        default_quorum = settings.default_quorum,
        timeout_duration_hours = settings.timeout_duration_hours,
        sweep_interval_secs = settings.sweep_interval_secs,
        "Runtime settings loaded"
    );

    let token = read_bot_token()?;
    let gateway = Arc::new(
        RestGateway::new(&config.api_base_url, &token).context("Failed to build platform client")?,
    );
    info!("Platform API: {}", config.api_base_url);

    let state = AppState::new(pool, gateway, Arc::new(SystemClock), &settings);

    let sweeper = state
        .scheduler
        .clone()
        .spawn(Duration::from_secs(settings.sweep_interval_secs));

    let app = build_router(state);

    let port = args.port.unwrap_or(config.port);
    let addr: SocketAddr = format!("{}:{}", config.bind_addr, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind_addr, port))?;

    if !config.binds_loopback() {
        warn!(
            bind_addr = %config.bind_addr,
            "HTTP API is unauthenticated and reachable beyond loopback"
        );
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("modvote-engine listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
