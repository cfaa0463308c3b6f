// =============================================================================
// Config — environment-backed settings, read once at startup (spec §6.4,
// §14). No live reload.
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
    pub work_queue_capacity: usize,
    pub batch_size: usize,
    pub watchlist_reload_interval: Duration,
    pub min_required_bars: usize,
    pub signal_cooldown: Duration,
    pub rsi_guard_sideways_bear: f64,
    pub rsi_guard_bull: f64,
    pub vwap_deviation_warning_pct: f64,
    pub daily_buy_cap: risk_fabric::portfolio_guard::MaxBuyCountPerDay,
    pub momentum_cap_pct: f64,
    pub momentum_volume_ratio_threshold: f64,
    pub feature_conviction_enabled: bool,
    pub feature_orb_enabled: bool,
    pub no_trade_window_end: String,
    pub danger_zone_start: String,
    pub danger_zone_end: String,
    pub startup_retry_deadline: Duration,
    pub reclaim_interval: Duration,
    pub reclaim_min_idle: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            gateway_base_url: env_or("GATEWAY_BASE_URL", "http://127.0.0.1:8080"),
            gateway_http_timeout: Duration::from_secs(env_parse("GATEWAY_HTTP_TIMEOUT_SECS", 5u64)),
            consumer_name: env_or("SCANNER_CONSUMER_NAME", "scanner-1"),
            worker_count: env_parse("SCANNER_WORKER_COUNT", 4usize),
            work_queue_capacity: env_parse("SCANNER_WORK_QUEUE_CAPACITY", 1_000usize),
            batch_size: env_parse("SCANNER_BATCH_SIZE", 100usize),
            watchlist_reload_interval: Duration::from_secs(env_parse(
                "SCANNER_WATCHLIST_RELOAD_SECS",
                300u64,
            )),
            min_required_bars: env_parse("SCANNER_MIN_REQUIRED_BARS", 20usize),
            signal_cooldown: Duration::from_secs(env_parse("SCANNER_SIGNAL_COOLDOWN_SECS", 600u64)),
            rsi_guard_sideways_bear: env_parse("SCANNER_RSI_GUARD_SIDEWAYS_BEAR", 75.0),
            rsi_guard_bull: env_parse("SCANNER_RSI_GUARD_BULL", 85.0),
            vwap_deviation_warning_pct: env_parse("SCANNER_VWAP_DEVIATION_WARNING_PCT", 3.0),
            daily_buy_cap: risk_fabric::portfolio_guard::MaxBuyCountPerDay {
                strong_bull: env_parse("SCANNER_MAX_BUY_STRONG_BULL", 8u32),
                bull: env_parse("SCANNER_MAX_BUY_BULL", 6u32),
                sideways: env_parse("SCANNER_MAX_BUY_SIDEWAYS", 4u32),
                bear: env_parse("SCANNER_MAX_BUY_BEAR", 2u32),
                strong_bear: env_parse("SCANNER_MAX_BUY_STRONG_BEAR", 1u32),
            },
            momentum_cap_pct: env_parse("SCANNER_MOMENTUM_CAP_PCT", 5.0),
            momentum_volume_ratio_threshold: env_parse("SCANNER_MOMENTUM_VOLUME_RATIO", 2.0),
            feature_conviction_enabled: env_parse("SCANNER_FEATURE_CONVICTION_ENABLED", false),
            feature_orb_enabled: env_parse("SCANNER_FEATURE_ORB_ENABLED", false),
            no_trade_window_end: env_or("SCANNER_NO_TRADE_WINDOW_END", "09:15"),
            danger_zone_start: env_or("SCANNER_DANGER_ZONE_START", "14:00"),
            danger_zone_end: env_or("SCANNER_DANGER_ZONE_END", "15:00"),
            startup_retry_deadline: Duration::from_secs(env_parse(
                "SCANNER_STARTUP_RETRY_DEADLINE_SECS",
                30u64,
            )),
            reclaim_interval: Duration::from_secs(env_parse("SCANNER_RECLAIM_INTERVAL_SECS", 60u64)),
            reclaim_min_idle: Duration::from_secs(env_parse("SCANNER_RECLAIM_MIN_IDLE_SECS", 300u64)),
        }
    }
}
