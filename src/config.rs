use serde::Deserialize;
use std::str::FromStr;
use validator::Validate;

use crate::error::AppResult;

/// Process-wide host configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub rpc_url: String,
    pub db_max_connections: u32,
    pub worker: WorkerConfig,
}

/// Reconciliation worker settings, fixed for the lifetime of a worker
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct WorkerConfig {
    /// Candidates fetched per run
    #[validate(range(min = 1, max = 10000, message = "batch size must be between 1 and 10000"))]
    pub batch_size: i64,
    /// Delay between consecutive pairs; 0 disables it
    pub rate_limit_ms: u64,
    /// Interval between runs
    #[validate(range(min = 1, message = "poll interval must be positive"))]
    pub poll_interval_ms: u64,
    pub chain_id: i64,
    /// Upper bound on a single chain read
    #[validate(range(min = 1, message = "rpc timeout must be positive"))]
    pub rpc_timeout_ms: u64,
    /// Upper bound on a single ledger store call
    #[validate(range(min = 1, message = "store timeout must be positive"))]
    pub store_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            rate_limit_ms: 100,
            poll_interval_ms: 60_000,
            chain_id: 8453,
            rpc_timeout_ms: 10_000,
            store_timeout_ms: 10_000,
        }
    }
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let defaults = WorkerConfig::default();

        let worker = WorkerConfig {
            batch_size: env_or("RECONCILE_BATCH_SIZE", defaults.batch_size)?,
            rate_limit_ms: env_or("RECONCILE_RATE_LIMIT_MS", defaults.rate_limit_ms)?,
            poll_interval_ms: env_or("RECONCILE_POLL_INTERVAL_MS", defaults.poll_interval_ms)?,
            chain_id: env_or("CHAIN_ID", defaults.chain_id)?,
            rpc_timeout_ms: env_or("RPC_TIMEOUT_MS", defaults.rpc_timeout_ms)?,
            store_timeout_ms: env_or("STORE_TIMEOUT_MS", defaults.store_timeout_ms)?,
        };
        worker.validate()?;

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            rpc_url: required("RPC_URL")?,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 5)?,
            worker,
        })
    }
}

fn required(key: &str) -> Result<String, config::ConfigError> {
    std::env::var(key).map_err(|_| config::ConfigError::NotFound(key.to_string()))
}

fn env_or<T>(key: &str, default: T) -> Result<T, config::ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, config::ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| config::ConfigError::Message(format!("{} has invalid value {:?}: {}", key, raw, e)))
}
