//! Configuration module for the rap rounds service.
//!
//! All configuration is loaded from environment variables. The store
//! connection string is mandatory; everything else has a default.

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

pub const DATABASE_URL_VAR: &str = "RAPROUNDS_DATABASE_URL";
pub const BIND_ADDR_VAR: &str = "RAPROUNDS_BIND_ADDR";
pub const LOG_LEVEL_VAR: &str = "RAPROUNDS_LOG_LEVEL";
pub const MAX_CONNECTIONS_VAR: &str = "RAPROUNDS_DB_MAX_CONNECTIONS";
pub const TIMEOUT_SECS_VAR: &str = "RAPROUNDS_DB_TIMEOUT_SECS";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Connection string of the shared round store
    pub database_url: String,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Upper bound on pooled store connections
    pub max_connections: u32,
    /// Store request timeout; exceeding it is a transient error
    pub store_timeout: Duration,
}

/// Startup configuration failure. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { var: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(var) => {
                write!(f, "required environment variable {} is not set", var)
            }
            ConfigError::Invalid { var, value } => {
                write!(f, "invalid value for {}: {:?}", var, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables (and `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let database_url = env::var(DATABASE_URL_VAR)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing(DATABASE_URL_VAR))?;

        let bind_addr = parse_var(BIND_ADDR_VAR, "127.0.0.1:8080")?;
        let log_level = env::var(LOG_LEVEL_VAR).unwrap_or_else(|_| "info".to_string());
        let max_connections = parse_var(MAX_CONNECTIONS_VAR, "5")?;
        let timeout_secs: u64 = parse_var(TIMEOUT_SECS_VAR, "5")?;

        Ok(Self {
            database_url,
            bind_addr,
            log_level,
            max_connections,
            store_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = env::var(var).unwrap_or_else(|_| default.to_string());
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { var, value })
}
