// Black-box coverage of the scenarios named in the spec's worked examples
// (the cash-floor-in-BEAR rejection in particular), exercised through the
// crate's public API only.

use chrono::Utc;
use domain::portfolio::PortfolioState;
use domain::regime::MarketRegime;
use domain::signal::{BuySignal, SignalSource, SignalType};
use domain::stock_code::StockCode;
use domain::watchlist::{RiskTag, TradeTier};
use risk_fabric::portfolio_guard::{evaluate, GuardOutcome, PortfolioGuardConfig};

fn candidate_signal() -> BuySignal {
    BuySignal::new(
        StockCode::new("000001").unwrap(),
        "Example Corp",
        SignalType::GoldenCross,
        50_000.0,
        65.0,
        72.0,
        TradeTier::Tier1,
        RiskTag::Neutral,
        MarketRegime::Bear,
        SignalSource::Scanner,
        Utc::now(),
        1.0,
    )
    .unwrap()
}

#[test]
fn worked_example_cash_floor_blocks_buy_in_bear() {
    let portfolio = PortfolioState {
        positions: vec![],
        cash_balance: 2_400_000.0,
        total_asset: 10_000_000.0,
        stock_eval_amount: 7_600_000.0,
        position_count: 3,
        timestamp: Utc::now(),
    };

    let outcome = evaluate(
        &candidate_signal(),
        &portfolio,
        MarketRegime::Bear,
        0,
        500_000.0,
        "Tech",
        &PortfolioGuardConfig::default(),
    );

    match outcome {
        GuardOutcome::Block(reason) => assert!(reason.starts_with("CASH_FLOOR")),
        GuardOutcome::Pass => panic!("expected a cash floor rejection"),
    }
}

#[test]
fn full_portfolio_blocks_before_any_other_check_even_when_cash_is_fine() {
    let portfolio = PortfolioState {
        positions: vec![],
        cash_balance: 9_000_000.0,
        total_asset: 10_000_000.0,
        stock_eval_amount: 1_000_000.0,
        position_count: 10,
        timestamp: Utc::now(),
    };

    let outcome = evaluate(
        &candidate_signal(),
        &portfolio,
        MarketRegime::Bull,
        0,
        100_000.0,
        "Tech",
        &PortfolioGuardConfig::default(),
    );

    match outcome {
        GuardOutcome::Block(reason) => assert!(reason.starts_with("POSITION_COUNT")),
        GuardOutcome::Pass => panic!("expected a position count rejection"),
    }
}
