use std::env;
use std::fmt::Display;
use std::str::FromStr;

use tracing::info;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub dbname: String,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    /// Port for the process's own /healthz and /metrics endpoints.
    pub listen_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, so tests never have to
    /// mutate the process environment.
    pub fn from_source(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseConfig {
                host: or_default(&lookup, "DATABASE_HOST", "database"),
                user: or_default(&lookup, "DATABASE_USER", "postgres"),
                password: or_default(&lookup, "DATABASE_PASSWORD", "postgres"),
                dbname: or_default(&lookup, "DATABASE_NAME", "votes"),
            },
            queue: QueueConfig {
                host: or_default(&lookup, "REDIS_HOST", "localhost"),
                port: parse_or_default(&lookup, "REDIS_PORT", "6379")?,
            },
            listen_port: parse_or_default(&lookup, "LISTEN_PORT", "8080")?,
        })
    }
}

fn or_default(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn parse_or_default<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = or_default(lookup, key, default);
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value,
        reason: e.to_string(),
    })
}
