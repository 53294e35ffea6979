//! Configuration management for the registry.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Binaries call `dotenvy::dotenv()` first so a local `.env` file is honoured.

use rsvp_postgres::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_CONNECTIONS, DEFAULT_MIN_CONNECTIONS,
    DEFAULT_WATERMARK_LAG, PostgresConfig,
};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default number of events per listing page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;
/// Default upper bound on `knownIds` per sync request.
pub const DEFAULT_MAX_KNOWN_IDS: usize = 10_000;
/// Default `tracing` filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,rsvp_registry=debug,sqlx=warn";

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `STORE_BACKEND` holds an unknown value.
    #[error("Unknown store backend {0:?} (expected \"memory\" or \"postgres\")")]
    UnknownBackend(String),

    /// The postgres backend was selected without a connection string.
    #[error("DATABASE_URL must be set when STORE_BACKEND=postgres")]
    MissingDatabaseUrl,
}

/// Which [`EntityStore`](rsvp_core::EntityStore) implementation to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// In-process store, state is lost on exit
    #[default]
    Memory,
    /// `PostgreSQL` via `rsvp-postgres`
    Postgres,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Postgres => write!(f, "postgres"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Selected store backend
    pub store: StoreBackend,
    /// `PostgreSQL` settings; `None` unless `DATABASE_URL` is set
    pub postgres: Option<PostgresConfig>,
    /// Listing page size
    pub events_page_size: u32,
    /// Largest accepted `knownIds` set
    pub sync_max_known_ids: usize,
    /// `tracing` filter directive
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreBackend::Memory,
            postgres: None,
            events_page_size: DEFAULT_PAGE_SIZE,
            sync_max_known_ids: DEFAULT_MAX_KNOWN_IDS,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Unparsable numeric values fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an unknown `STORE_BACKEND`, or for the
    /// postgres backend without `DATABASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    ///
    /// # Example
    ///
    /// ```
    /// use rsvp_registry::config::{Config, StoreBackend};
    ///
    /// let config = Config::from_lookup(|key| match key {
    ///     "EVENTS_PAGE_SIZE" => Some("25".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.store, StoreBackend::Memory);
    /// assert_eq!(config.events_page_size, 25);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = lookup("STORE_BACKEND")
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<StoreBackend>())
            .transpose()?
            .unwrap_or_default();

        let postgres = lookup("DATABASE_URL")
            .filter(|s| !s.trim().is_empty())
            .map(|url| PostgresConfig {
                url,
                max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")
                    .unwrap_or(DEFAULT_MAX_CONNECTIONS),
                min_connections: parse_var(&lookup, "DATABASE_MIN_CONNECTIONS")
                    .unwrap_or(DEFAULT_MIN_CONNECTIONS),
                connect_timeout: parse_var(&lookup, "DATABASE_CONNECT_TIMEOUT")
                    .map_or(DEFAULT_CONNECT_TIMEOUT, Duration::from_secs),
                watermark_lag: parse_var(&lookup, "DATABASE_WATERMARK_LAG_MS")
                    .map_or(DEFAULT_WATERMARK_LAG, Duration::from_millis),
            });

        if store == StoreBackend::Postgres && postgres.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        Ok(Self {
            store,
            postgres,
            events_page_size: parse_var(&lookup, "EVENTS_PAGE_SIZE")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(DEFAULT_PAGE_SIZE),
            sync_max_known_ids: parse_var(&lookup, "SYNC_MAX_KNOWN_IDS")
                .unwrap_or(DEFAULT_MAX_KNOWN_IDS),
            log_filter: lookup("RUST_LOG")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn postgres_backend_reads_pool_settings() {
        let config = Config::from_lookup(lookup(&[
            ("STORE_BACKEND", "postgres"),
            ("DATABASE_URL", "postgres://db/rsvp"),
            ("DATABASE_MAX_CONNECTIONS", "32"),
            ("DATABASE_CONNECT_TIMEOUT", "5"),
            ("DATABASE_WATERMARK_LAG_MS", "1500"),
        ]))
        .unwrap();

        assert_eq!(config.store, StoreBackend::Postgres);
        let pg = config.postgres.unwrap();
        assert_eq!(pg.url, "postgres://db/rsvp");
        assert_eq!(pg.max_connections, 32);
        assert_eq!(pg.min_connections, DEFAULT_MIN_CONNECTIONS);
        assert_eq!(pg.connect_timeout, Duration::from_secs(5));
        assert_eq!(pg.watermark_lag, Duration::from_millis(1500));
    }

    #[test]
    fn postgres_backend_requires_url() {
        let err = Config::from_lookup(lookup(&[("STORE_BACKEND", "postgres")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingDatabaseUrl);
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let err = Config::from_lookup(lookup(&[("STORE_BACKEND", "mongo")])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBackend(b) if b == "mongo"));
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("EVENTS_PAGE_SIZE", "0"),
            ("SYNC_MAX_KNOWN_IDS", "lots"),
        ]))
        .unwrap();
        assert_eq!(config.events_page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.sync_max_known_ids, DEFAULT_MAX_KNOWN_IDS);
    }
}
