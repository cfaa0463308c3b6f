// =============================================================================
// Config — environment-backed settings for the Sell Executor (spec §4.5,
// §5 "Cancellation and timeouts").
// =============================================================================

use std::time::Duration;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or_else(|| {
            if std::env::var(key).is_ok() {
                tracing::warn!(key, "invalid env value, using default");
            }
            default
        })
}

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub gateway_base_url: String,
    pub gateway_http_timeout: Duration,
    pub consumer_name: String,
    pub worker_count: usize,
    pub batch_size: usize,
    pub reclaim_interval: Duration,
    pub reclaim_min_idle: Duration,
    pub confirm_poll_interval: Duration,
    pub confirm_poll_attempts: u32,
    /// Hard Stop is the one sell reason exempt from the "no auto-retry on
    /// venue failure" rule (spec §4.5 "Failure semantics").
    pub hard_stop_max_retries: u32,
    pub hard_stop_retry_backoff: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            gateway_base_url: env_or("GATEWAY_BASE_URL", "http://127.0.0.1:8080"),
            gateway_http_timeout: Duration::from_secs(env_parse("GATEWAY_HTTP_TIMEOUT_SECS", 5u64)),
            consumer_name: env_or("SELL_EXECUTOR_CONSUMER_NAME", "sell-executor-1"),
            worker_count: env_parse("SELL_EXECUTOR_WORKER_COUNT", 4usize),
            batch_size: env_parse("SELL_EXECUTOR_BATCH_SIZE", 100usize),
            reclaim_interval: Duration::from_secs(env_parse("SELL_EXECUTOR_RECLAIM_INTERVAL_SECS", 60u64)),
            reclaim_min_idle: Duration::from_secs(env_parse("SELL_EXECUTOR_RECLAIM_MIN_IDLE_SECS", 300u64)),
            confirm_poll_interval: Duration::from_secs(env_parse("SELL_EXECUTOR_CONFIRM_POLL_INTERVAL_SECS", 2u64)),
            confirm_poll_attempts: env_parse("SELL_EXECUTOR_CONFIRM_POLL_ATTEMPTS", 3u32),
            hard_stop_max_retries: env_parse("SELL_EXECUTOR_HARD_STOP_MAX_RETRIES", 3u32),
            hard_stop_retry_backoff: Duration::from_secs(env_parse("SELL_EXECUTOR_HARD_STOP_RETRY_BACKOFF_SECS", 2u64)),
        }
    }
}
