// =============================================================================
// Portfolio Guard — pure function, no I/O. Implemented once here and called
// from the Buy Executor only (spec §4.6), so every regime/threshold tweak
// lives in exactly one place instead of being re-derived per caller.
//
// The five sub-checks run in the fixed order the spec gives in §4.4 step 9
// (a..e) and the guard returns on the first one that fails — later checks
// never run once an earlier one has already blocked the trade.
// =============================================================================

use domain::portfolio::PortfolioState;
use domain::regime::MarketRegime;
use domain::signal::BuySignal;

#[derive(Debug, Clone, PartialEq)]
pub enum GuardOutcome {
    Pass,
    Block(String),
}

impl GuardOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

#[derive(Debug, Clone)]
pub struct PortfolioGuardConfig {
    pub max_portfolio_size: u32,
    pub sector_cap_pct: f64,
    pub sector_cap_pct_strong_bull: f64,
    pub stock_cap_pct: f64,
    pub stock_cap_pct_strong_bull: f64,
    pub max_buy_count_per_day: MaxBuyCountPerDay,
}

#[derive(Debug, Clone, Copy)]
pub struct MaxBuyCountPerDay {
    pub strong_bull: u32,
    pub bull: u32,
    pub sideways: u32,
    pub bear: u32,
    pub strong_bear: u32,
}

impl MaxBuyCountPerDay {
    pub fn for_regime(&self, regime: MarketRegime) -> u32 {
        match regime {
            MarketRegime::StrongBull => self.strong_bull,
            MarketRegime::Bull => self.bull,
            MarketRegime::Sideways => self.sideways,
            MarketRegime::Bear => self.bear,
            MarketRegime::StrongBear => self.strong_bear,
        }
    }
}

impl Default for MaxBuyCountPerDay {
    fn default() -> Self {
        Self {
            strong_bull: 8,
            bull: 6,
            sideways: 4,
            bear: 2,
            strong_bear: 1,
        }
    }
}

impl Default for PortfolioGuardConfig {
    fn default() -> Self {
        Self {
            max_portfolio_size: 10,
            sector_cap_pct: 30.0,
            sector_cap_pct_strong_bull: 50.0,
            stock_cap_pct: 15.0,
            stock_cap_pct_strong_bull: 25.0,
            max_buy_count_per_day: MaxBuyCountPerDay::default(),
        }
    }
}

fn cash_floor_pct(regime: MarketRegime) -> f64 {
    match regime {
        MarketRegime::StrongBull | MarketRegime::Bull => 10.0,
        MarketRegime::Sideways => 15.0,
        MarketRegime::Bear | MarketRegime::StrongBear => 25.0,
    }
}

/// Evaluates the candidate `signal` against the current `portfolio` and
/// `regime`. `daily_buy_count` is the number of buys already executed today
/// (before this one), and `candidate_notional` is the planned order value
/// used for the post-trade sector/stock concentration checks.
pub fn evaluate(
    signal: &BuySignal,
    portfolio: &PortfolioState,
    regime: MarketRegime,
    daily_buy_count: u32,
    candidate_notional: f64,
    candidate_sector: &str,
    config: &PortfolioGuardConfig,
) -> GuardOutcome {
    // (a) total position count
    if portfolio.position_count >= config.max_portfolio_size {
        return GuardOutcome::Block(format!(
            "POSITION_COUNT {} >= {}",
            portfolio.position_count, config.max_portfolio_size
        ));
    }

    // (b) cash floor by regime
    let floor = cash_floor_pct(regime);
    let cash_ratio_pct = portfolio.cash_ratio() * 100.0;
    if cash_ratio_pct < floor {
        return GuardOutcome::Block(format!(
            "CASH_FLOOR {cash_ratio_pct:.2} < {floor:.2}"
        ));
    }

    // (c) sector concentration, post-trade
    let sector_cap = if regime == MarketRegime::StrongBull {
        config.sector_cap_pct_strong_bull
    } else {
        config.sector_cap_pct
    };
    let sector_value = portfolio.sector_exposure_pct(candidate_sector) / 100.0 * portfolio.total_asset
        + candidate_notional;
    let sector_pct_after = if portfolio.total_asset > 0.0 {
        sector_value / portfolio.total_asset * 100.0
    } else {
        0.0
    };
    if sector_pct_after > sector_cap {
        return GuardOutcome::Block(format!(
            "SECTOR_CONCENTRATION {sector_pct_after:.2} > {sector_cap:.2}"
        ));
    }

    // (d) single-stock concentration, post-trade
    let stock_cap = if regime == MarketRegime::StrongBull {
        config.stock_cap_pct_strong_bull
    } else {
        config.stock_cap_pct
    };
    let stock_pct_after = if portfolio.total_asset > 0.0 {
        candidate_notional / portfolio.total_asset * 100.0
    } else {
        0.0
    };
    if stock_pct_after > stock_cap {
        return GuardOutcome::Block(format!(
            "STOCK_CONCENTRATION {stock_pct_after:.2} > {stock_cap:.2}"
        ));
    }

    // (e) daily buy counter
    let limit = config.max_buy_count_per_day.for_regime(regime);
    if daily_buy_count >= limit {
        return GuardOutcome::Block(format!("DAILY_BUY_LIMIT {daily_buy_count} >= {limit}"));
    }

    let _ = signal;
    GuardOutcome::Pass
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::signal::{BuySignal, SignalSource, SignalType};
    use domain::stock_code::StockCode;
    use domain::watchlist::{RiskTag, TradeTier};

    fn signal() -> BuySignal {
        BuySignal::new(
            StockCode::new("005930").unwrap(),
            "Samsung",
            SignalType::GoldenCross,
            72_100.0,
            70.0,
            78.0,
            TradeTier::Tier1,
            RiskTag::Neutral,
            MarketRegime::Bull,
            SignalSource::Scanner,
            Utc::now(),
            1.0,
        )
        .unwrap()
    }

    fn portfolio(position_count: u32, cash_balance: f64, total_asset: f64) -> PortfolioState {
        PortfolioState {
            positions: vec![],
            cash_balance,
            total_asset,
            stock_eval_amount: total_asset - cash_balance,
            position_count,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn blocks_on_cash_floor_in_bear() {
        let outcome = evaluate(
            &signal(),
            &portfolio(3, 2_400_000.0, 10_000_000.0),
            MarketRegime::Bear,
            0,
            500_000.0,
            "Tech",
            &PortfolioGuardConfig::default(),
        );
        assert!(matches!(outcome, GuardOutcome::Block(ref r) if r.starts_with("CASH_FLOOR")));
    }

    #[test]
    fn passes_when_all_checks_clear() {
        let outcome = evaluate(
            &signal(),
            &portfolio(3, 5_000_000.0, 10_000_000.0),
            MarketRegime::Bull,
            0,
            500_000.0,
            "Tech",
            &PortfolioGuardConfig::default(),
        );
        assert_eq!(outcome, GuardOutcome::Pass);
    }

    #[test]
    fn blocks_on_position_count() {
        let outcome = evaluate(
            &signal(),
            &portfolio(10, 5_000_000.0, 10_000_000.0),
            MarketRegime::Bull,
            0,
            500_000.0,
            "Tech",
            &PortfolioGuardConfig::default(),
        );
        assert!(matches!(outcome, GuardOutcome::Block(ref r) if r.starts_with("POSITION_COUNT")));
    }

    #[test]
    fn blocks_on_daily_buy_limit() {
        let outcome = evaluate(
            &signal(),
            &portfolio(3, 5_000_000.0, 10_000_000.0),
            MarketRegime::StrongBear,
            1,
            500_000.0,
            "Tech",
            &PortfolioGuardConfig::default(),
        );
        assert!(matches!(outcome, GuardOutcome::Block(ref r) if r.starts_with("DAILY_BUY_LIMIT")));
    }

    #[test]
    fn strong_bull_relaxes_stock_cap() {
        // 20% of total_asset: blocked under the default 15% cap, allowed
        // once the regime is STRONG_BULL and the cap relaxes to 25%.
        let config = PortfolioGuardConfig::default();
        let blocked = evaluate(
            &signal(),
            &portfolio(3, 5_000_000.0, 10_000_000.0),
            MarketRegime::Bull,
            0,
            2_000_000.0,
            "Tech",
            &config,
        );
        assert!(matches!(blocked, GuardOutcome::Block(ref r) if r.starts_with("STOCK_CONCENTRATION")));

        let passed = evaluate(
            &signal(),
            &portfolio(3, 5_000_000.0, 10_000_000.0),
            MarketRegime::StrongBull,
            0,
            2_000_000.0,
            "Tech",
            &config,
        );
        assert_eq!(passed, GuardOutcome::Pass);
    }
}
