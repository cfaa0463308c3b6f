// =============================================================================
// Config — environment-backed settings, read once at startup. No live
// reload: a changed tunable requires a process restart (spec §6.4).
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub bind_addr: String,
    pub admin_token: Option<String>,
    pub venue_base_url: String,
    pub venue_ws_url: String,
    pub venue_api_key: String,
    pub venue_secret: String,
    pub token_file_path: String,
    pub rate_bucket_tokens_per_sec: f64,
    pub rate_bucket_acquire_timeout: Duration,
    pub breaker_failure_threshold: u32,
    pub breaker_failure_window: Duration,
    pub breaker_open_duration: Duration,
    pub http_timeout: Duration,
    pub tick_stream_maxlen: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            bind_addr: env_or("GATEWAY_BIND_ADDR", "0.0.0.0:8080"),
            admin_token: std::env::var("GATEWAY_ADMIN_TOKEN").ok(),
            venue_base_url: env_or("VENUE_BASE_URL", "https://openapi.koreainvestment.com:9443"),
            venue_ws_url: env_or("VENUE_WS_URL", "wss://ops.koreainvestment.com:21000"),
            venue_api_key: std::env::var("VENUE_API_KEY").context("VENUE_API_KEY must be set")?,
            venue_secret: std::env::var("VENUE_SECRET").context("VENUE_SECRET must be set")?,
            token_file_path: env_or("GATEWAY_TOKEN_FILE", "/var/lib/trading-core/gateway_token.json"),
            rate_bucket_tokens_per_sec: env_parse("GATEWAY_RATE_BUCKET_PER_SEC", 19.0)?,
            rate_bucket_acquire_timeout: Duration::from_millis(env_parse(
                "GATEWAY_RATE_ACQUIRE_TIMEOUT_MS",
                2_000u64,
            )?),
            breaker_failure_threshold: env_parse("GATEWAY_BREAKER_FAILURE_THRESHOLD", 5u32)?,
            breaker_failure_window: Duration::from_secs(env_parse(
                "GATEWAY_BREAKER_FAILURE_WINDOW_SECS",
                30u64,
            )?),
            breaker_open_duration: Duration::from_secs(env_parse(
                "GATEWAY_BREAKER_OPEN_SECS",
                60u64,
            )?),
            http_timeout: Duration::from_secs(env_parse("GATEWAY_HTTP_TIMEOUT_SECS", 5u64)?),
            tick_stream_maxlen: env_parse("GATEWAY_TICK_STREAM_MAXLEN", 100_000usize)?,
        })
    }
}
