// =============================================================================
// Config — environment-backed settings for the Price Monitor (spec §4.3,
// §6.4 "Sell" group). No live reload, same `env_or`/`env_parse` shape as
// every other binary in the workspace.
// =============================================================================

use std::time::Duration;

use domain::regime::MarketRegime;

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

/// One rung of a regime's scale-out ladder: fire once `profit_pct` reaches
/// `activation_pct`, selling `sell_pct` of the then-current quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleOutLevel {
    pub activation_pct: f64,
    pub sell_pct: f64,
}

/// The three regime-specific ladders from spec §4.3 rule 6. STRONG_BULL
/// reuses BULL's ladder and STRONG_BEAR reuses BEAR's, consistent with the
/// rest of the spec's pattern of the "strong" regimes sharing their
/// non-strong sibling's thresholds unless a literal override is given.
#[derive(Debug, Clone)]
pub struct ScaleOutLadders {
    pub bull: Vec<ScaleOutLevel>,
    pub sideways: Vec<ScaleOutLevel>,
    pub bear: Vec<ScaleOutLevel>,
}

impl ScaleOutLadders {
    pub fn for_regime(&self, regime: MarketRegime) -> &[ScaleOutLevel] {
        match regime {
            MarketRegime::Bull | MarketRegime::StrongBull => &self.bull,
            MarketRegime::Sideways => &self.sideways,
            MarketRegime::Bear | MarketRegime::StrongBear => &self.bear,
        }
    }

    fn default_ladders() -> Self {
        let level = |a: f64, s: f64| ScaleOutLevel {
            activation_pct: a,
            sell_pct: s,
        };
        Self {
            bull: vec![level(7.0, 25.0), level(15.0, 25.0), level(25.0, 15.0)],
            sideways: vec![
                level(3.0, 25.0),
                level(7.0, 25.0),
                level(12.0, 25.0),
                level(18.0, 15.0),
            ],
            bear: vec![
                level(2.0, 25.0),
                level(5.0, 25.0),
                level(8.0, 25.0),
                level(12.0, 15.0),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExitChainConfig {
    pub hard_stop_pct: f64,
    pub profit_floor_activation_pct: f64,
    pub profit_floor_pullback_pct: f64,
    pub profit_lock_l1_activation_pct: f64,
    pub profit_lock_l1_floor_pct: f64,
    pub profit_lock_l2_activation_pct: f64,
    pub profit_lock_l2_floor_pct: f64,
    pub breakeven_activation_pct: f64,
    pub breakeven_floor_pct: f64,
    pub atr_stop_multiplier: f64,
    pub stop_loss_pct: f64,
    pub time_tighten_start_days: i64,
    pub time_tighten_start_days_bull: i64,
    pub time_tighten_max_pp: f64,
    pub max_holding_days: i64,
    pub trailing_activation_pct: f64,
    pub trailing_drop_from_high_pct: f64,
    pub rsi_overbought_threshold: f64,
    pub rsi_overbought_min_profit_pct: f64,
    pub target_profit_pct: f64,
    pub death_cross_bear_only: bool,
    pub scale_out: ScaleOutLadders,
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
    pub reconciliation_interval: Duration,
    pub min_required_bars: usize,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub ma_short_period: usize,
    pub ma_long_period: usize,
    pub startup_retry_deadline: Duration,
    pub reclaim_interval: Duration,
    pub reclaim_min_idle: Duration,
    pub positions_live_ttl: Duration,
    pub position_cache_ttl: Duration,
    pub exit_chain: ExitChainConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            gateway_base_url: env_or("GATEWAY_BASE_URL", "http://127.0.0.1:8080"),
            gateway_http_timeout: Duration::from_secs(env_parse("GATEWAY_HTTP_TIMEOUT_SECS", 5u64)),
            consumer_name: env_or("MONITOR_CONSUMER_NAME", "price-monitor-1"),
            worker_count: env_parse("MONITOR_WORKER_COUNT", 4usize),
            work_queue_capacity: env_parse("MONITOR_WORK_QUEUE_CAPACITY", 1_000usize),
            batch_size: env_parse("MONITOR_BATCH_SIZE", 100usize),
            reconciliation_interval: Duration::from_secs(env_parse(
                "MONITOR_RECONCILIATION_INTERVAL_SECS",
                30u64,
            )),
            min_required_bars: env_parse("MONITOR_MIN_REQUIRED_BARS", 20usize),
            rsi_period: env_parse("MONITOR_RSI_PERIOD", 14usize),
            atr_period: env_parse("MONITOR_ATR_PERIOD", 14usize),
            ma_short_period: env_parse("MONITOR_MA_SHORT_PERIOD", 5usize),
            ma_long_period: env_parse("MONITOR_MA_LONG_PERIOD", 20usize),
            startup_retry_deadline: Duration::from_secs(env_parse(
                "MONITOR_STARTUP_RETRY_DEADLINE_SECS",
                30u64,
            )),
            reclaim_interval: Duration::from_secs(env_parse("MONITOR_RECLAIM_INTERVAL_SECS", 60u64)),
            reclaim_min_idle: Duration::from_secs(env_parse("MONITOR_RECLAIM_MIN_IDLE_SECS", 300u64)),
            positions_live_ttl: Duration::from_secs(env_parse("MONITOR_POSITIONS_LIVE_TTL_SECS", 60u64)),
            position_cache_ttl: Duration::from_secs(env_parse("MONITOR_POSITION_CACHE_TTL_SECS", 60u64)),
            exit_chain: ExitChainConfig {
                hard_stop_pct: env_parse("MONITOR_HARD_STOP_PCT", 10.0),
                profit_floor_activation_pct: env_parse("MONITOR_PROFIT_FLOOR_ACTIVATION_PCT", 15.0),
                profit_floor_pullback_pct: env_parse("MONITOR_PROFIT_FLOOR_PULLBACK_PCT", 10.0),
                profit_lock_l1_activation_pct: env_parse("MONITOR_PROFIT_LOCK_L1_ACTIVATION_PCT", 5.0),
                profit_lock_l1_floor_pct: env_parse("MONITOR_PROFIT_LOCK_L1_FLOOR_PCT", 0.7),
                profit_lock_l2_activation_pct: env_parse("MONITOR_PROFIT_LOCK_L2_ACTIVATION_PCT", 10.0),
                profit_lock_l2_floor_pct: env_parse("MONITOR_PROFIT_LOCK_L2_FLOOR_PCT", 2.0),
                breakeven_activation_pct: env_parse("MONITOR_BREAKEVEN_ACTIVATION_PCT", 3.0),
                breakeven_floor_pct: env_parse("MONITOR_BREAKEVEN_FLOOR_PCT", 0.3),
                atr_stop_multiplier: env_parse("MONITOR_ATR_STOP_MULTIPLIER", 2.0),
                stop_loss_pct: env_parse("MONITOR_STOP_LOSS_PCT", 6.0),
                time_tighten_start_days: env_parse("MONITOR_TIME_TIGHTEN_START_DAYS", 10),
                time_tighten_start_days_bull: env_parse("MONITOR_TIME_TIGHTEN_START_DAYS_BULL", 15),
                time_tighten_max_pp: env_parse("MONITOR_TIME_TIGHTEN_MAX_PP", 2.0),
                max_holding_days: env_parse("MONITOR_MAX_HOLDING_DAYS", 30),
                trailing_activation_pct: env_parse("MONITOR_TRAILING_ACTIVATION_PCT", 4.0),
                trailing_drop_from_high_pct: env_parse("MONITOR_TRAILING_DROP_FROM_HIGH_PCT", 3.0),
                rsi_overbought_threshold: env_parse("MONITOR_RSI_OVERBOUGHT_THRESHOLD", 75.0),
                rsi_overbought_min_profit_pct: env_parse("MONITOR_RSI_OVERBOUGHT_MIN_PROFIT_PCT", 3.0),
                target_profit_pct: env_parse("MONITOR_TARGET_PROFIT_PCT", 10.0),
                death_cross_bear_only: env_parse("MONITOR_DEATH_CROSS_BEAR_ONLY", true),
                scale_out: ScaleOutLadders::default_ladders(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_out_ladder_selection_matches_regime() {
        let ladders = ScaleOutLadders::default_ladders();
        assert_eq!(ladders.for_regime(MarketRegime::Bull).len(), 3);
        assert_eq!(ladders.for_regime(MarketRegime::StrongBull).len(), 3);
        assert_eq!(ladders.for_regime(MarketRegime::Sideways).len(), 4);
        assert_eq!(ladders.for_regime(MarketRegime::Bear).len(), 4);
        assert_eq!(ladders.for_regime(MarketRegime::StrongBear).len(), 4);
    }
}
