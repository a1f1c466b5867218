use std::time::Duration;

use tracing::warn;

/// Connection settings read from the environment, with working defaults
/// for a local server.
#[derive(Clone, Debug)]
pub struct Config {
    pub endpoint: String,
    pub db_index: Option<i64>,
    pub auth: Option<String>,
    pub bucket: String,
    pub max_idle: usize,
    pub idle_timeout: Duration,
}

impl Config {
    const DEFAULT_ENDPOINT: &str = "127.0.0.1:6379";
    const DEFAULT_BUCKET: &str = "hash_key";
    const DEFAULT_MAX_IDLE: usize = 3;
    const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 180;

    pub fn from_env() -> Self {
        let endpoint = std::env::var("CACHE_REDIS_ENDPOINT")
            .unwrap_or_else(|_| Self::DEFAULT_ENDPOINT.to_string());
        let db_index = match std::env::var("CACHE_REDIS_DB") {
            Ok(raw) => match raw.parse::<i64>() {
                Ok(index) => Some(index),
                Err(_) => {
                    warn!("CACHE_REDIS_DB is not an integer: {raw}, ignoring");
                    None
                }
            },
            Err(_) => None,
        };
        let max_idle = std::env::var("CACHE_REDIS_MAX_IDLE")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_IDLE.to_string())
            .parse::<usize>()
            .unwrap_or(Self::DEFAULT_MAX_IDLE);
        let idle_timeout_secs = std::env::var("CACHE_REDIS_IDLE_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_IDLE_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .unwrap_or(Self::DEFAULT_IDLE_TIMEOUT_SECS);
        Self {
            endpoint,
            db_index,
            auth: std::env::var("CACHE_REDIS_AUTH").ok(),
            bucket: std::env::var("CACHE_REDIS_BUCKET")
                .unwrap_or_else(|_| Self::DEFAULT_BUCKET.to_string()),
            max_idle,
            idle_timeout: Duration::from_secs(idle_timeout_secs),
        }
    }
}
