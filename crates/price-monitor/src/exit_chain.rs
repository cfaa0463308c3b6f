// =============================================================================
// Exit chain — the ordered 12-rule decision table a held position is run
// through on every tick (spec §4.3). Rule order is a hard contract: callers
// try rules in declaration order and stop at the first hit, so the chain is
// total (exactly one rule fires, or none do) by construction rather than by
// convention. Grounded on the Buy Scanner's `risk_gates::evaluate` shape
// (ordered checks, first failure/hit wins, `Display` on the outcome enum
// for structured logging) generalized from "first rejection" to "first
// match."
// =============================================================================

use domain::position::Position;
use domain::regime::{MarketRegime, TradingContext};
use domain::sell_order::SellReason;

use crate::config::ExitChainConfig;

/// Everything the exit chain needs about a held position at the moment of
/// a tick. Built fresh per tick from the in-memory position plus whatever
/// the bar ring currently holds (spec §4.3 "Per-tick context").
#[derive(Debug, Clone, Copy)]
pub struct PositionContext<'a> {
    pub position: &'a Position,
    pub current_price: f64,
    pub holding_days: i64,
    pub rsi: Option<f64>,
    pub atr: Option<f64>,
    pub ma5: Option<f64>,
    pub ma20: Option<f64>,
    pub prev_ma5: Option<f64>,
    pub prev_ma20: Option<f64>,
    pub trading_context: &'a TradingContext,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitDecision {
    pub reason: SellReason,
    /// Fraction of the current quantity to sell: 1.0 for every full-exit
    /// rule, a ladder rung's fraction for Scale-Out, 0.5 for RSI Overbought.
    pub sell_fraction: f64,
}

fn is_bullish(regime: MarketRegime) -> bool {
    matches!(regime, MarketRegime::Bull | MarketRegime::StrongBull)
}

/// Time-tightening of the Fixed Stop threshold (spec §4.3 "Time-tightening
/// of Fixed Stop"): the longer a losing position is held past
/// `start_days`, the closer the effective stop moves to zero, capped at
/// `time_tighten_max_pp` percentage points of tightening.
pub fn tightened_stop_threshold(holding_days: i64, config: &ExitChainConfig, regime: MarketRegime) -> f64 {
    let start_days = if is_bullish(regime) {
        config.time_tighten_start_days_bull
    } else {
        config.time_tighten_start_days
    };
    if holding_days <= start_days {
        return config.stop_loss_pct;
    }
    let span = (config.max_holding_days - start_days).max(1) as f64;
    let progress = (holding_days - start_days) as f64 / span;
    let tighten = (config.time_tighten_max_pp * progress).min(config.time_tighten_max_pp);
    (config.stop_loss_pct - tighten).max(0.0)
}

/// Runs the full ordered chain, returning the first rule that fires.
pub fn evaluate(ctx: &PositionContext, config: &ExitChainConfig) -> Option<ExitDecision> {
    let profit_pct = ctx.position.profit_pct(ctx.current_price);
    let high_profit_pct = ctx.position.high_profit_pct();
    let regime = ctx.trading_context.regime;
    let macro_stop_mult = ctx.trading_context.stop_loss_multiplier;

    // Rule 0: Hard Stop — always on, highest priority.
    if profit_pct <= -config.hard_stop_pct {
        return Some(full_exit(SellReason::StopLoss));
    }

    // Rule 1: Profit Floor — reached the activation high, then pulled back
    // below the pullback threshold.
    if high_profit_pct >= config.profit_floor_activation_pct
        && profit_pct < config.profit_floor_pullback_pct
    {
        return Some(full_exit(SellReason::ProfitFloor));
    }

    // Rule 2: Profit Lock L1/L2 — ATR-style ratcheting floor; the higher
    // activation threshold wins since it implies the lower one also holds.
    if high_profit_pct >= config.profit_lock_l2_activation_pct
        && profit_pct < config.profit_lock_l2_floor_pct
    {
        return Some(full_exit(SellReason::ProfitLock));
    }
    if high_profit_pct >= config.profit_lock_l1_activation_pct
        && profit_pct < config.profit_lock_l1_floor_pct
    {
        return Some(full_exit(SellReason::ProfitLock));
    }

    // Rule 2.5: Breakeven Stop — rallied, then retraced almost to entry.
    if high_profit_pct >= config.breakeven_activation_pct && profit_pct < config.breakeven_floor_pct {
        return Some(full_exit(SellReason::BreakevenStop));
    }

    // Rule 3: ATR Stop.
    if let Some(atr) = ctx.atr {
        let stop_price = ctx.position.average_buy_price - atr * config.atr_stop_multiplier;
        if ctx.current_price <= stop_price {
            return Some(full_exit(SellReason::AtrStop));
        }
    }

    // Rule 4: Fixed Stop, time-tightened.
    let threshold = tightened_stop_threshold(ctx.holding_days, config, regime) * macro_stop_mult;
    if profit_pct <= -threshold {
        return Some(full_exit(SellReason::StopLoss));
    }

    // Rule 5: Trailing TP.
    let trailing_activated = high_profit_pct >= config.trailing_activation_pct;
    if trailing_activated && ctx.position.high_watermark > 0.0 {
        let drop_from_high_pct =
            (ctx.position.high_watermark - ctx.current_price) / ctx.position.high_watermark * 100.0;
        if drop_from_high_pct >= config.trailing_drop_from_high_pct {
            return Some(full_exit(SellReason::TrailingStop));
        }
    }

    // Rule 6: Scale-Out, regime-specific ladder. `scale_out_level` is the
    // Sell Executor's own cursor (spec §3: only the sell executor mutates
    // it, on a confirmed partial fill); the Monitor only reads it to know
    // which rung to test next and never advances it itself, so a
    // re-evaluation before the executor confirms the prior rung simply
    // re-proposes the same rung rather than skipping ahead.
    let ladder = config.scale_out.for_regime(regime);
    if let Some(level) = ladder.get(ctx.position.scale_out_level) {
        if profit_pct >= level.activation_pct {
            return Some(ExitDecision {
                reason: SellReason::ScaleOut,
                sell_fraction: level.sell_pct / 100.0,
            });
        }
    }

    // Rule 7: RSI Overbought — skipped once Trailing TP has already
    // activated, since the trailing mechanism is already tracking the exit.
    if !trailing_activated {
        if let Some(rsi) = ctx.rsi {
            if rsi >= config.rsi_overbought_threshold && profit_pct >= config.rsi_overbought_min_profit_pct
            {
                return Some(ExitDecision {
                    reason: SellReason::RsiOverbought,
                    sell_fraction: 0.5,
                });
            }
        }
    }

    // Rule 8: Target Profit — only once trailing has not taken over.
    if !trailing_activated && profit_pct >= config.target_profit_pct {
        return Some(full_exit(SellReason::ProfitTarget));
    }

    // Rule 9: Death Cross — disabled in BULL/STRONG_BULL when configured.
    if !(config.death_cross_bear_only && is_bullish(regime)) {
        if let (Some(ma5), Some(ma20), Some(prev_ma5), Some(prev_ma20)) =
            (ctx.ma5, ctx.ma20, ctx.prev_ma5, ctx.prev_ma20)
        {
            let crossed_down = prev_ma5 >= prev_ma20 && ma5 < ma20;
            if crossed_down && profit_pct < 0.0 {
                return Some(full_exit(SellReason::DeathCross));
            }
        }
    }

    // Rule 10: Time Exit.
    if ctx.holding_days > config.max_holding_days {
        return Some(full_exit(SellReason::TimeExit));
    }

    None
}

fn full_exit(reason: SellReason) -> ExitDecision {
    ExitDecision {
        reason,
        sell_fraction: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::stock_code::StockCode;

    fn position(avg: f64, hwm: f64) -> Position {
        let mut pos = Position::open(
            StockCode::new("005930").unwrap(),
            "Samsung",
            100,
            avg,
            "semis",
            avg * 0.94,
            Utc::now(),
        )
        .unwrap();
        pos.bump_high_watermark(hwm);
        pos
    }

    fn context(regime: MarketRegime) -> TradingContext {
        let mut ctx = TradingContext::fallback(Utc::now().date_naive());
        ctx.regime = regime;
        ctx
    }

    fn ctx<'a>(
        position: &'a Position,
        current_price: f64,
        holding_days: i64,
        trading_context: &'a TradingContext,
    ) -> PositionContext<'a> {
        PositionContext {
            position,
            current_price,
            holding_days,
            rsi: None,
            atr: None,
            ma5: None,
            ma20: None,
            prev_ma5: None,
            prev_ma20: None,
            trading_context,
        }
    }

    #[test]
    fn hard_stop_fires_at_minus_ten_pct() {
        let config = crate::config::Config::from_env().exit_chain;
        let pos = position(10_000.0, 10_000.0);
        let tc = context(MarketRegime::Bull);
        let decision = evaluate(&ctx(&pos, 9_000.0, 1, &tc), &config).unwrap();
        assert_eq!(decision.reason, SellReason::StopLoss);
        assert_eq!(decision.sell_fraction, 1.0);
    }

    #[test]
    fn breakeven_stop_spec_boundary_2_999_does_not_fire() {
        let config = crate::config::Config::from_env().exit_chain;
        let pos = position(10_000.0, 10_000.0 * 1.02999);
        let tc = context(MarketRegime::Bull);
        let decision = evaluate(&ctx(&pos, 10_020.0, 1, &tc), &config);
        assert!(decision.is_none());
    }

    #[test]
    fn breakeven_stop_spec_worked_example_fires() {
        let config = crate::config::Config::from_env().exit_chain;
        let pos = position(10_000.0, 10_400.0);
        let tc = context(MarketRegime::Bull);
        let decision = evaluate(&ctx(&pos, 10_020.0, 1, &tc), &config).unwrap();
        assert_eq!(decision.reason, SellReason::BreakevenStop);
    }

    #[test]
    fn trailing_stop_worked_example_fires() {
        let config = crate::config::Config::from_env().exit_chain;
        let pos = position(72_120.0, 75_100.0);
        let tc = context(MarketRegime::Bull);
        // drop from 75,100 to 72,800 is ~3.06%, above the 3.0% threshold.
        let decision = evaluate(&ctx(&pos, 72_800.0, 1, &tc), &config).unwrap();
        assert_eq!(decision.reason, SellReason::TrailingStop);
    }

    #[test]
    fn trailing_not_yet_activated_under_four_pct_high_profit() {
        let config = crate::config::Config::from_env().exit_chain;
        let pos = position(72_120.0, 75_000.0); // high_profit ~3.99%, below 4% activation
        let tc = context(MarketRegime::Bull);
        let decision = evaluate(&ctx(&pos, 73_000.0, 1, &tc), &config);
        assert!(decision.is_none());
    }

    #[test]
    fn scale_out_fires_first_bull_rung_at_seven_pct() {
        let config = crate::config::Config::from_env().exit_chain;
        let pos = position(10_000.0, 10_700.0);
        let tc = context(MarketRegime::Bull);
        let decision = evaluate(&ctx(&pos, 10_700.0, 1, &tc), &config).unwrap();
        assert_eq!(decision.reason, SellReason::ScaleOut);
        assert!((decision.sell_fraction - 0.25).abs() < 1e-9);
    }

    #[test]
    fn scale_out_cursor_advances_to_next_rung() {
        let config = crate::config::Config::from_env().exit_chain;
        let mut pos = position(10_000.0, 10_700.0);
        pos.scale_out_level = 1;
        let tc = context(MarketRegime::Bull);
        // Below the second rung's 15% activation: no fire yet.
        assert!(evaluate(&ctx(&pos, 10_700.0, 1, &tc), &config).is_none());
        pos.bump_high_watermark(11_500.0);
        let decision = evaluate(&ctx(&pos, 11_500.0, 1, &tc), &config).unwrap();
        assert_eq!(decision.reason, SellReason::ScaleOut);
    }

    #[test]
    fn death_cross_disabled_in_bull() {
        let config = crate::config::Config::from_env().exit_chain;
        let pos = position(10_000.0, 10_000.0);
        let tc = context(MarketRegime::Bull);
        let mut c = ctx(&pos, 9_800.0, 1, &tc);
        c.ma5 = Some(99.0);
        c.ma20 = Some(100.0);
        c.prev_ma5 = Some(101.0);
        c.prev_ma20 = Some(100.0);
        assert!(evaluate(&c, &config).is_none());
    }

    #[test]
    fn death_cross_fires_in_sideways_while_losing() {
        let config = crate::config::Config::from_env().exit_chain;
        let pos = position(10_000.0, 10_000.0);
        let tc = context(MarketRegime::Sideways);
        let mut c = ctx(&pos, 9_800.0, 1, &tc);
        c.ma5 = Some(99.0);
        c.ma20 = Some(100.0);
        c.prev_ma5 = Some(101.0);
        c.prev_ma20 = Some(100.0);
        let decision = evaluate(&c, &config).unwrap();
        assert_eq!(decision.reason, SellReason::DeathCross);
    }

    #[test]
    fn time_exit_fires_past_max_holding_days() {
        let config = crate::config::Config::from_env().exit_chain;
        let pos = position(10_000.0, 10_000.0);
        let tc = context(MarketRegime::Sideways);
        let decision = evaluate(&ctx(&pos, 10_000.0, 31, &tc), &config).unwrap();
        assert_eq!(decision.reason, SellReason::TimeExit);
    }

    #[test]
    fn time_tightening_at_start_days_plus_one() {
        let config = crate::config::Config::from_env().exit_chain;
        let threshold = tightened_stop_threshold(11, &config, MarketRegime::Sideways);
        let span = (config.max_holding_days - config.time_tighten_start_days) as f64;
        let expected = (config.stop_loss_pct - (config.time_tighten_max_pp / span)).max(0.0);
        assert!((threshold - expected).abs() < 1e-9);
    }

    #[test]
    fn no_rule_fires_on_a_flat_small_gain() {
        let config = crate::config::Config::from_env().exit_chain;
        let pos = position(10_000.0, 10_100.0);
        let tc = context(MarketRegime::Sideways);
        assert!(evaluate(&ctx(&pos, 10_050.0, 1, &tc), &config).is_none());
    }
}
