// =============================================================================
// Config — environment-backed settings for the Buy Executor (spec §6.4,
// §9: momentum_limit_premium called out explicitly as "should be config").
// =============================================================================

use std::time::Duration;

use risk_fabric::portfolio_guard::PortfolioGuardConfig;

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
    pub session_open: String,
    pub session_close: String,
    pub duplicate_order_window: Duration,
    pub scout_hybrid_floor: f64,
    pub correlation_threshold: f64,
    pub min_viable_notional: f64,
    pub momentum_limit_premium: f64,
    pub momentum_limit_timeout: Duration,
    pub confirm_poll_interval: Duration,
    pub confirm_poll_attempts: u32,
    pub stop_loss_pct: f64,
    pub position_cache_ttl: Duration,
    pub guard: PortfolioGuardConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            gateway_base_url: env_or("GATEWAY_BASE_URL", "http://127.0.0.1:8080"),
            gateway_http_timeout: Duration::from_secs(env_parse("GATEWAY_HTTP_TIMEOUT_SECS", 5u64)),
            consumer_name: env_or("BUY_EXECUTOR_CONSUMER_NAME", "buy-executor-1"),
            worker_count: env_parse("BUY_EXECUTOR_WORKER_COUNT", 4usize),
            batch_size: env_parse("BUY_EXECUTOR_BATCH_SIZE", 100usize),
            reclaim_interval: Duration::from_secs(env_parse("BUY_EXECUTOR_RECLAIM_INTERVAL_SECS", 60u64)),
            reclaim_min_idle: Duration::from_secs(env_parse("BUY_EXECUTOR_RECLAIM_MIN_IDLE_SECS", 300u64)),
            session_open: env_or("BUY_EXECUTOR_SESSION_OPEN", "09:00"),
            session_close: env_or("BUY_EXECUTOR_SESSION_CLOSE", "15:30"),
            duplicate_order_window: Duration::from_secs(env_parse(
                "BUY_EXECUTOR_DUPLICATE_ORDER_WINDOW_SECS",
                600u64,
            )),
            scout_hybrid_floor: env_parse("BUY_EXECUTOR_SCOUT_HYBRID_FLOOR", 40.0),
            correlation_threshold: env_parse("BUY_EXECUTOR_CORRELATION_THRESHOLD", 0.85),
            min_viable_notional: env_parse("BUY_EXECUTOR_MIN_VIABLE_NOTIONAL", 100_000.0),
            momentum_limit_premium: env_parse("BUY_EXECUTOR_MOMENTUM_LIMIT_PREMIUM", 0.003),
            momentum_limit_timeout: Duration::from_secs(env_parse(
                "BUY_EXECUTOR_MOMENTUM_LIMIT_TIMEOUT_SECS",
                10u64,
            )),
            confirm_poll_interval: Duration::from_secs(env_parse("BUY_EXECUTOR_CONFIRM_POLL_INTERVAL_SECS", 2u64)),
            confirm_poll_attempts: env_parse("BUY_EXECUTOR_CONFIRM_POLL_ATTEMPTS", 3u32),
            stop_loss_pct: env_parse("BUY_EXECUTOR_STOP_LOSS_PCT", 6.0),
            position_cache_ttl: Duration::from_secs(env_parse("BUY_EXECUTOR_POSITION_CACHE_TTL_SECS", 60u64)),
            guard: PortfolioGuardConfig {
                max_portfolio_size: env_parse("BUY_EXECUTOR_MAX_PORTFOLIO_SIZE", 10u32),
                sector_cap_pct: env_parse("BUY_EXECUTOR_SECTOR_CAP_PCT", 30.0),
                sector_cap_pct_strong_bull: env_parse("BUY_EXECUTOR_SECTOR_CAP_PCT_STRONG_BULL", 50.0),
                stock_cap_pct: env_parse("BUY_EXECUTOR_STOCK_CAP_PCT", 15.0),
                stock_cap_pct_strong_bull: env_parse("BUY_EXECUTOR_STOCK_CAP_PCT_STRONG_BULL", 25.0),
                max_buy_count_per_day: risk_fabric::portfolio_guard::MaxBuyCountPerDay {
                    strong_bull: env_parse("BUY_EXECUTOR_MAX_BUY_COUNT_STRONG_BULL", 8u32),
                    bull: env_parse("BUY_EXECUTOR_MAX_BUY_COUNT_BULL", 6u32),
                    sideways: env_parse("BUY_EXECUTOR_MAX_BUY_COUNT_SIDEWAYS", 4u32),
                    bear: env_parse("BUY_EXECUTOR_MAX_BUY_COUNT_BEAR", 2u32),
                    strong_bear: env_parse("BUY_EXECUTOR_MAX_BUY_COUNT_STRONG_BEAR", 1u32),
                },
            },
        }
    }
}
