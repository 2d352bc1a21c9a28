use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::rate_limiter::RateLimiterConfig;
use crate::response::BlockMessage;

/// Service configuration, read from the environment with defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (`BIND_ADDR`).
    pub bind_addr: SocketAddr,
    /// Counting window length in milliseconds (`RATE_LIMIT_WINDOW_MS`).
    pub window_ms: u64,
    /// Requests allowed per window (`RATE_LIMIT_MAX_REQUESTS`).
    pub max_requests: u32,
    /// First-violation block in milliseconds (`RATE_LIMIT_INITIAL_BLOCK_MS`).
    pub initial_block_ms: u64,
    /// Sweep cadence in seconds (`CLEANUP_INTERVAL`).
    pub cleanup_interval_secs: u64,
    /// Default tracing filter level (`LOG_LEVEL`).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_addr: parse_var("BIND_ADDR", "127.0.0.1:3000")?,
            window_ms: parse_var("RATE_LIMIT_WINDOW_MS", "60000")?,
            max_requests: parse_var("RATE_LIMIT_MAX_REQUESTS", "15")?,
            initial_block_ms: parse_var("RATE_LIMIT_INITIAL_BLOCK_MS", "1200000")?,
            cleanup_interval_secs: parse_var("CLEANUP_INTERVAL", "120")?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Limiter options derived from the service-level settings.
    pub fn limiter(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            window: Duration::from_millis(self.window_ms),
            max_requests: self.max_requests,
            initial_block: Duration::from_millis(self.initial_block_ms),
            message: BlockMessage::default(),
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            window_ms: 60_000,
            max_requests: 15,
            initial_block_ms: 1_200_000,
            cleanup_interval_secs: crate::cleanup::SWEEP_INTERVAL.as_secs(),
            log_level: "info".to_string(),
        }
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .map_err(|e| Error::Config(format!("invalid {}: {}", name, e)))
}
