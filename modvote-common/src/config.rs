//! Bootstrap configuration loading
//!
//! Two-tier configuration:
//! 1. **TOML bootstrap**: database path, listen address, platform API base URL,
//!    sweep interval, logging (static, read once at startup)
//! 2. **Database runtime**: defaults in the `settings` table (see `db::settings`)
//!
//! Config file resolution order:
//! 1. Command-line argument (highest priority)
//! 2. `MODVOTE_CONFIG` environment variable
//! 3. `~/.config/modvote/config.toml`
//! 4. Compiled defaults (missing file is not an error)

use crate::{Error, Result};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MODVOTE_CONFIG";

/// Environment variable holding the platform bot token
pub const BOT_TOKEN_ENV_VAR: &str = "MODVOTE_BOT_TOKEN";

/// Default platform REST API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// SQLite database file. Defaults to `<data dir>/modvote/modvote.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// HTTP listen address
    ///
    /// The HTTP API has no authentication and trusts the `user_id` a caller
    /// sends, so it is meant to sit on loopback behind the platform relay.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Platform REST API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Overrides the `sweep_interval_secs` database setting when present
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            bind_addr: default_bind_addr(),
            port: default_port(),
            api_base_url: default_api_base_url(),
            sweep_interval_secs: None,
            logging: LoggingConfig::default(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5790
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }

    /// Load configuration following the resolution order in the module docs
    ///
    /// An explicitly named file that cannot be read is an error. A missing
    /// default file falls back to compiled defaults with a warning.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = resolve_config_path(cli_path) {
            info!("Loading configuration from {}", path.display());
            return Self::from_file(&path);
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::from_file(&path)
            }
            _ => {
                warn!("No configuration file found, using compiled defaults");
                Ok(Self::default())
            }
        }
    }

    /// Whether `bind_addr` only accepts local connections
    pub fn binds_loopback(&self) -> bool {
        self.bind_addr == "localhost"
            || self
                .bind_addr
                .parse::<IpAddr>()
                .map(|ip| ip.is_loopback())
                .unwrap_or(false)
    }

    /// Database path with the data-directory fallback applied
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }
}

/// Explicit config path from CLI argument or environment, if any
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    std::env::var(CONFIG_ENV_VAR)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("modvote").join("config.toml"))
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("modvote"))
        .unwrap_or_else(|| PathBuf::from("./modvote_data"))
        .join("modvote.db")
}

/// Read the platform bot token from the environment
pub fn read_bot_token() -> Result<String> {
    match std::env::var(BOT_TOKEN_ENV_VAR) {
        Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(Error::Config(format!("{} is not set", BOT_TOKEN_ENV_VAR))),
    }
}
