//! Application configuration.
//!
//! Values are resolved with priority: config.toml > environment (including
//! `.env`) > built-in default.

use chrono::Duration;
use serde::Deserialize;
use std::path::PathBuf;

use crate::auth::SessionExpiry;

/// Config file read from the working directory
pub const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_DATABASE_PATH: &str = "data/auth.db";

/// Server address to bind to
pub const SERVER_ADDR: &str = "0.0.0.0";

/// Server port
pub const SERVER_PORT: u16 = 3000;

/// Longest accepted `expires_in_days`
pub const MAX_SESSION_EXPIRY_DAYS: i64 = 36_500;

/// Deployment environment; production turns on `Secure` cookies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

// ==================== config.toml ====================

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    database: Option<DatabaseConfig>,
    server: Option<ServerConfig>,
    session: Option<SessionConfig>,
}

#[derive(Debug, Deserialize)]
struct DatabaseConfig {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    addr: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct SessionConfig {
    expires_in_days: Option<i64>,
}

/// Resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: PathBuf,
    pub server_addr: String,
    pub server_port: u16,
    pub environment: Environment,
    pub session_expiry: SessionExpiry,
}

impl Settings {
    /// Load `.env`, `config.toml` and the process environment.
    pub fn load() -> Self {
        // Load .env file if present
        let _ = dotenvy::dotenv();
        let contents = std::fs::read_to_string(CONFIG_FILE).ok();
        Self::from_sources(contents.as_deref(), |key| std::env::var(key).ok())
    }

    /// Resolve settings from config file contents and an environment lookup.
    pub fn from_sources(config_toml: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Self {
        let file = config_toml
            .and_then(|contents| match toml::from_str::<ConfigFile>(contents) {
                Ok(file) => Some(file),
                Err(e) => {
                    tracing::warn!("Ignoring invalid {}: {}", CONFIG_FILE, e);
                    None
                }
            })
            .unwrap_or_default();

        let database_path = file
            .database
            .and_then(|db| db.path)
            .or_else(|| env("DATABASE_PATH"))
            .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string());

        let (file_addr, file_port) = file
            .server
            .map(|s| (s.addr, s.port))
            .unwrap_or((None, None));
        let server_addr = file_addr
            .or_else(|| env("SERVER_ADDR"))
            .unwrap_or_else(|| SERVER_ADDR.to_string());
        let server_port = file_port
            .or_else(|| parse_env(&env, "PORT"))
            .unwrap_or(SERVER_PORT);

        let expires_in_days = file
            .session
            .and_then(|s| s.expires_in_days)
            .or_else(|| parse_env(&env, "SESSION_EXPIRES_IN_DAYS"));
        let session_expiry = match expires_in_days {
            Some(days) => match session_span(days) {
                Some(span) => SessionExpiry::Sliding(span),
                None => {
                    tracing::warn!(
                        "Ignoring session expiry of {} days (expected 1..={})",
                        days,
                        MAX_SESSION_EXPIRY_DAYS
                    );
                    SessionExpiry::Never
                }
            },
            None => SessionExpiry::Never,
        };

        let environment = env("APP_ENV")
            .map(|name| Environment::from_name(&name))
            .unwrap_or_default();

        Settings {
            database_path: PathBuf::from(database_path),
            server_addr,
            server_port,
            environment,
            session_expiry,
        }
    }

    /// Get the full server bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_addr, self.server_port)
    }
}

fn session_span(days: i64) -> Option<Duration> {
    if !(1..=MAX_SESSION_EXPIRY_DAYS).contains(&days) {
        return None;
    }
    Duration::try_days(days)
}

fn parse_env<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}={}", key, raw);
            None
        }
    }
}
