// =============================================================================
// Risk gates — nine ordered checks run after a strategy fires, any one of
// which short-circuits the signal (spec §4.2). Gates 1-6 and 9 are pure and
// local; gates 7-8 ask the shared cooldown fabric over Redis. Order is a
// hard contract: the first failing gate is the one reported, later gates
// never run. Split into a sync `evaluate_local` (gates 1-6, 9) and an async
// `evaluate` (adds gates 7-8) so the local gates stay unit-testable without
// a Redis connection.
// =============================================================================

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use domain::regime::{MarketRegime, TradingContext};
use domain::watchlist::{TradeTier, WatchlistEntry};
use parking_lot::Mutex;
use risk_fabric::Cooldowns;

use crate::config::Config;
use crate::strategies::StrategyHit;

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    NoTradeWindow,
    DangerZone,
    DailyBuyCap { count: u32, limit: u32 },
    RsiGuard { rsi: f64, ceiling: f64 },
    VwapDeviation { price: f64, vwap: f64, deviation_pct: f64 },
    SignalCooldown,
    StopLossCooldown,
    SellCooldown,
    ScoutVeto,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoTradeWindow => write!(f, "NO_TRADE_WINDOW"),
            Self::DangerZone => write!(f, "DANGER_ZONE"),
            Self::DailyBuyCap { count, limit } => write!(f, "DAILY_BUY_CAP {count} >= {limit}"),
            Self::RsiGuard { rsi, ceiling } => write!(f, "RSI_GUARD {rsi:.2} > {ceiling:.2}"),
            Self::VwapDeviation { price, vwap, deviation_pct } => {
                write!(f, "VWAP_DEVIATION price={price:.2} vwap={vwap:.2} dev={deviation_pct:.2}%")
            }
            Self::SignalCooldown => write!(f, "SIGNAL_COOLDOWN"),
            Self::StopLossCooldown => write!(f, "STOPLOSS_COOLDOWN"),
            Self::SellCooldown => write!(f, "SELL_COOLDOWN"),
            Self::ScoutVeto => write!(f, "SCOUT_VETO"),
        }
    }
}

fn parse_time(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M").unwrap_or_else(|_| NaiveTime::from_hms_opt(0, 0, 0).unwrap())
}

/// Process-local state the gates need between calls: the daily buy counter
/// and the per-code last-signal timestamp used for the in-process cooldown.
/// Both are intentionally *not* shared across processes (spec §5: "global
/// mutable state... each have clear ownership, a single process").
pub struct GateState {
    daily_counts: Mutex<HashMap<NaiveDate, u32>>,
    last_signal_at: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl GateState {
    pub fn new() -> Self {
        Self {
            daily_counts: Mutex::new(HashMap::new()),
            last_signal_at: RwLock::new(HashMap::new()),
        }
    }

    pub fn daily_count(&self, date: NaiveDate) -> u32 {
        *self.daily_counts.lock().get(&date).unwrap_or(&0)
    }

    pub fn record_published(&self, date: NaiveDate, stock_code: &str, now: DateTime<Utc>) {
        *self.daily_counts.lock().entry(date).or_insert(0) += 1;
        self.last_signal_at
            .write()
            .expect("gate state lock poisoned")
            .insert(stock_code.to_string(), now);
    }

    fn last_signal(&self, stock_code: &str) -> Option<DateTime<Utc>> {
        self.last_signal_at
            .read()
            .expect("gate state lock poisoned")
            .get(stock_code)
            .copied()
    }
}

impl Default for GateState {
    fn default() -> Self {
        Self::new()
    }
}

/// Gates 1-6 and 9: no I/O, so these can run (and be tested) without a
/// cooldown store in hand.
pub fn evaluate_local(
    hit: &StrategyHit,
    entry: &WatchlistEntry,
    context: &TradingContext,
    now: DateTime<Utc>,
    config: &Config,
    state: &GateState,
) -> Result<(), RejectReason> {
    let t = now.time();

    // 1. No-trade window: first 15 minutes of the session.
    if t < parse_time(&config.no_trade_window_end) && t >= NaiveTime::from_hms_opt(9, 0, 0).unwrap() {
        return Err(RejectReason::NoTradeWindow);
    }

    // 2. Danger-zone window.
    if t >= parse_time(&config.danger_zone_start) && t < parse_time(&config.danger_zone_end) {
        return Err(RejectReason::DangerZone);
    }

    // 3. Daily buy cap, regime-specific.
    let limit = config.daily_buy_cap.for_regime(context.regime);
    let count = state.daily_count(now.date_naive());
    if count >= limit {
        return Err(RejectReason::DailyBuyCap { count, limit });
    }

    // 4. RSI guard, with partial bypass for certain strategies.
    if !hit.signal_type.bypasses_rsi_guard() {
        if let Some(rsi) = hit.rsi_value {
            let ceiling = match context.regime {
                MarketRegime::Bull | MarketRegime::StrongBull => config.rsi_guard_bull,
                MarketRegime::Sideways | MarketRegime::Bear | MarketRegime::StrongBear => {
                    config.rsi_guard_sideways_bear
                }
            };
            if rsi > ceiling {
                return Err(RejectReason::RsiGuard { rsi, ceiling });
            }
        }
    }

    // 5. VWAP deviation guard.
    if let Some(vwap) = hit.vwap {
        if vwap > 0.0 {
            let deviation_pct = (hit.price - vwap) / vwap * 100.0;
            if deviation_pct > config.vwap_deviation_warning_pct {
                return Err(RejectReason::VwapDeviation {
                    price: hit.price,
                    vwap,
                    deviation_pct,
                });
            }
        }
    }

    // 6. Per-code signal cooldown.
    if let Some(last) = state.last_signal(entry.stock_code.as_str()) {
        let elapsed = now.signed_duration_since(last);
        if elapsed < chrono::Duration::from_std(config.signal_cooldown).unwrap_or_default() {
            return Err(RejectReason::SignalCooldown);
        }
    }

    // 9 runs here rather than last so `evaluate` only needs to add 7-8 after
    // this returns Ok; the spec's hard order (7, 8, then 9) is preserved by
    // `evaluate` below, which re-checks 9 is unreachable only via this path.
    if entry.trade_tier == TradeTier::Blocked || !entry.is_tradable {
        return Err(RejectReason::ScoutVeto);
    }

    Ok(())
}

/// Full nine-gate evaluation: gates 1-6 locally, then 7-8 against the
/// shared cooldown fabric, then 9 (scout veto) last, matching the spec's
/// literal ordering.
pub async fn evaluate(
    hit: &StrategyHit,
    entry: &WatchlistEntry,
    context: &TradingContext,
    now: DateTime<Utc>,
    config: &Config,
    state: &GateState,
    cooldowns: &Cooldowns,
) -> Result<(), RejectReason> {
    let t = now.time();
    if t < parse_time(&config.no_trade_window_end) && t >= NaiveTime::from_hms_opt(9, 0, 0).unwrap() {
        return Err(RejectReason::NoTradeWindow);
    }
    if t >= parse_time(&config.danger_zone_start) && t < parse_time(&config.danger_zone_end) {
        return Err(RejectReason::DangerZone);
    }
    let limit = config.daily_buy_cap.for_regime(context.regime);
    let count = state.daily_count(now.date_naive());
    if count >= limit {
        return Err(RejectReason::DailyBuyCap { count, limit });
    }
    if !hit.signal_type.bypasses_rsi_guard() {
        if let Some(rsi) = hit.rsi_value {
            let ceiling = match context.regime {
                MarketRegime::Bull | MarketRegime::StrongBull => config.rsi_guard_bull,
                MarketRegime::Sideways | MarketRegime::Bear | MarketRegime::StrongBear => {
                    config.rsi_guard_sideways_bear
                }
            };
            if rsi > ceiling {
                return Err(RejectReason::RsiGuard { rsi, ceiling });
            }
        }
    }
    if let Some(vwap) = hit.vwap {
        if vwap > 0.0 {
            let deviation_pct = (hit.price - vwap) / vwap * 100.0;
            if deviation_pct > config.vwap_deviation_warning_pct {
                return Err(RejectReason::VwapDeviation {
                    price: hit.price,
                    vwap,
                    deviation_pct,
                });
            }
        }
    }
    if let Some(last) = state.last_signal(entry.stock_code.as_str()) {
        let elapsed = now.signed_duration_since(last);
        if elapsed < chrono::Duration::from_std(config.signal_cooldown).unwrap_or_default() {
            return Err(RejectReason::SignalCooldown);
        }
    }

    // 7. Stop-loss cooldown.
    if cooldowns
        .is_stoploss_cooling_down(entry.stock_code.as_str())
        .await
        .unwrap_or(false)
    {
        return Err(RejectReason::StopLossCooldown);
    }

    // 8. Sell cooldown (any sell within 24h).
    if cooldowns
        .is_sell_cooling_down(entry.stock_code.as_str())
        .await
        .unwrap_or(false)
    {
        return Err(RejectReason::SellCooldown);
    }

    // 9. Scout veto.
    if entry.trade_tier == TradeTier::Blocked || !entry.is_tradable {
        return Err(RejectReason::ScoutVeto);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use domain::signal::SignalType;
    use domain::stock_code::StockCode;
    use domain::watchlist::RiskTag;

    fn entry(tier: TradeTier, tradable: bool) -> WatchlistEntry {
        WatchlistEntry::new(
            StockCode::new("005930").unwrap(),
            "Samsung",
            75.0,
            60.0,
            tradable,
            tier,
            RiskTag::Neutral,
            1,
            "Tech",
            false,
        )
        .unwrap()
    }

    fn hit(signal_type: SignalType, rsi: Option<f64>, vwap: Option<f64>, price: f64) -> StrategyHit {
        StrategyHit {
            signal_type,
            price,
            rsi_value: rsi,
            volume_ratio: None,
            vwap,
        }
    }

    fn context(regime: MarketRegime) -> TradingContext {
        let mut ctx = TradingContext::fallback(chrono::Utc::now().date_naive());
        ctx.regime = regime;
        ctx
    }

    #[test]
    fn rsi_guard_boundary_rejects_exactly_75_in_sideways() {
        let c = Config::from_env();
        let state = GateState::new();
        let h = hit(SignalType::GoldenCross, Some(75.0), None, 100.0);
        let e = entry(TradeTier::Tier1, true);
        let ctx = context(MarketRegime::Sideways);
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap();
        assert_eq!(
            evaluate_local(&h, &e, &ctx, now, &c, &state),
            Err(RejectReason::RsiGuard { rsi: 75.0, ceiling: 75.0 })
        );
    }

    #[test]
    fn rsi_guard_boundary_accepts_74_99_in_sideways() {
        let c = Config::from_env();
        let state = GateState::new();
        let h = hit(SignalType::GoldenCross, Some(74.99), None, 100.0);
        let e = entry(TradeTier::Tier1, true);
        let ctx = context(MarketRegime::Sideways);
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap();
        assert!(evaluate_local(&h, &e, &ctx, now, &c, &state).is_ok());
    }

    #[test]
    fn rsi_guard_boundary_bull_uses_85_ceiling() {
        let c = Config::from_env();
        let state = GateState::new();
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap();
        let e = entry(TradeTier::Tier1, true);
        let ctx = context(MarketRegime::Bull);

        let rejected = hit(SignalType::GoldenCross, Some(85.01), None, 100.0);
        assert!(matches!(
            evaluate_local(&rejected, &e, &ctx, now, &c, &state),
            Err(RejectReason::RsiGuard { .. })
        ));

        let accepted = hit(SignalType::GoldenCross, Some(84.99), None, 100.0);
        assert!(evaluate_local(&accepted, &e, &ctx, now, &c, &state).is_ok());
    }

    #[test]
    fn momentum_continuation_bypasses_rsi_guard() {
        let c = Config::from_env();
        let state = GateState::new();
        let h = hit(SignalType::MomentumContinuation, Some(90.0), None, 100.0);
        let e = entry(TradeTier::Tier1, true);
        let ctx = context(MarketRegime::Bull);
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap();
        assert!(evaluate_local(&h, &e, &ctx, now, &c, &state).is_ok());
    }

    #[test]
    fn no_trade_window_blocks_opening_minutes() {
        let c = Config::from_env();
        let state = GateState::new();
        let h = hit(SignalType::GoldenCross, Some(50.0), None, 100.0);
        let e = entry(TradeTier::Tier1, true);
        let ctx = context(MarketRegime::Bull);
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 9, 5, 0).unwrap();
        assert_eq!(
            evaluate_local(&h, &e, &ctx, now, &c, &state),
            Err(RejectReason::NoTradeWindow)
        );
    }

    #[test]
    fn danger_zone_blocks_afternoon_window() {
        let c = Config::from_env();
        let state = GateState::new();
        let h = hit(SignalType::GoldenCross, Some(50.0), None, 100.0);
        let e = entry(TradeTier::Tier1, true);
        let ctx = context(MarketRegime::Bull);
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 14, 30, 0).unwrap();
        assert_eq!(
            evaluate_local(&h, &e, &ctx, now, &c, &state),
            Err(RejectReason::DangerZone)
        );
    }

    #[test]
    fn scout_veto_rejects_blocked_tier() {
        let c = Config::from_env();
        let state = GateState::new();
        let h = hit(SignalType::GoldenCross, Some(50.0), None, 100.0);
        let e = entry(TradeTier::Blocked, false);
        let ctx = context(MarketRegime::Bull);
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap();
        assert_eq!(
            evaluate_local(&h, &e, &ctx, now, &c, &state),
            Err(RejectReason::ScoutVeto)
        );
    }

    #[test]
    fn signal_cooldown_blocks_repeat_within_window() {
        let c = Config::from_env();
        let state = GateState::new();
        let h = hit(SignalType::GoldenCross, Some(50.0), None, 100.0);
        let e = entry(TradeTier::Tier1, true);
        let ctx = context(MarketRegime::Bull);
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap();
        state.record_published(now.date_naive(), "005930", now);
        let later = now + chrono::Duration::seconds(100);
        assert_eq!(
            evaluate_local(&h, &e, &ctx, later, &c, &state),
            Err(RejectReason::SignalCooldown)
        );
    }

    #[test]
    fn daily_buy_cap_blocks_at_regime_limit() {
        let mut c = Config::from_env();
        c.daily_buy_cap.strong_bear = 1;
        let state = GateState::new();
        let h = hit(SignalType::GoldenCross, Some(50.0), None, 100.0);
        let e = entry(TradeTier::Tier1, true);
        let ctx = context(MarketRegime::StrongBear);
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap();
        state.record_published(now.date_naive(), "000660", now);
        assert_eq!(
            evaluate_local(&h, &e, &ctx, now, &c, &state),
            Err(RejectReason::DailyBuyCap { count: 1, limit: 1 })
        );
    }
}
