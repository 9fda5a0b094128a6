//! Relay Configuration
//!
//! Read from `TTT_*` environment variables; anything unset takes its default.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Relay server configuration.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Address to listen on.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Close connections that send nothing for this long.
    pub idle_timeout: Duration,
    /// Waiting records older than this are deleted.
    pub stale_waiting_after: Duration,
    /// How often the cleanup loop runs.
    pub cleanup_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            stale_waiting_after: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Variable is set but does not parse.
    #[error("invalid value for {var}: {value:?}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
}

impl RelayConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: parse_var(&lookup, "TTT_BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            max_connections: parse_var(&lookup, "TTT_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            idle_timeout: secs_var(&lookup, "TTT_IDLE_TIMEOUT_SECS")?
                .unwrap_or(defaults.idle_timeout),
            stale_waiting_after: secs_var(&lookup, "TTT_STALE_WAITING_SECS")?
                .unwrap_or(defaults.stale_waiting_after),
            cleanup_interval: secs_var(&lookup, "TTT_CLEANUP_INTERVAL_SECS")?
                .unwrap_or(defaults.cleanup_interval),
        })
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

fn secs_var<F>(lookup: &F, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_var::<F, u64>(lookup, var)?.map(Duration::from_secs))
}
