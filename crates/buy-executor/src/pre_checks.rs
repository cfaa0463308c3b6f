// =============================================================================
// Pre-order checks — nine fail-fast gates run in the fixed order spec §4.4
// gives (1-9). The first one that rejects short-circuits the whole signal;
// later gates never run. Unlike the scanner's risk gates, several of these
// need live brokerage/portfolio state, so the whole chain is async and
// takes its collaborators by reference rather than bundling them into one
// state struct.
// =============================================================================

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use domain::portfolio::PortfolioState;
use domain::regime::MarketRegime;
use domain::signal::BuySignal;
use gateway_client::GatewayClient;
use risk_fabric::correlation::{CorrelationCache, DailyCloseSource};
use risk_fabric::locks::DistributedLock;
use risk_fabric::{Cooldowns, GuardOutcome, TradeLog};

use crate::config::Config;

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    OutsideSession,
    EmergencyStop,
    LockContention,
    AlreadyHeld,
    DuplicateOrderWindow,
    ScoutVeto { hybrid_score: f64 },
    StopLossCooldown,
    SellCooldown,
    Correlation { code: String, coefficient: f64 },
    Guard(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutsideSession => write!(f, "OUTSIDE_SESSION"),
            Self::EmergencyStop => write!(f, "EMERGENCY_STOP"),
            Self::LockContention => write!(f, "LOCK_CONTENTION"),
            Self::AlreadyHeld => write!(f, "ALREADY_HELD"),
            Self::DuplicateOrderWindow => write!(f, "DUPLICATE_ORDER_WINDOW"),
            Self::ScoutVeto { hybrid_score } => write!(f, "SCOUT_VETO hybrid={hybrid_score:.2}"),
            Self::StopLossCooldown => write!(f, "STOPLOSS_COOLDOWN"),
            Self::SellCooldown => write!(f, "SELL_COOLDOWN"),
            Self::Correlation { code, coefficient } => {
                write!(f, "CORRELATION {coefficient:.2} >= threshold (vs {code})")
            }
            Self::Guard(reason) => write!(f, "GUARD {reason}"),
        }
    }
}

/// `GatewayClient` implements the `DailyCloseSource` the correlation cache
/// needs, extracting just the close column from `daily_prices`. This is the
/// one place in the repo risk-fabric's HTTP-agnostic boundary gets crossed,
/// by design (see DESIGN.md's Open Question on correlation fetch-on-miss).
pub struct GatewayCloseSource<'a> {
    pub gateway: &'a GatewayClient,
}

#[async_trait]
impl<'a> DailyCloseSource for GatewayCloseSource<'a> {
    async fn daily_closes(&self, stock_code: &str, days: usize) -> anyhow::Result<Vec<f64>> {
        let code = domain::stock_code::StockCode::new(stock_code)?;
        let prices = self
            .gateway
            .daily_prices(&code, days)
            .await
            .map_err(|e| anyhow::anyhow!("gateway daily_prices failed: {e}"))?;
        Ok(prices.iter().map(|p| p.close).collect())
    }
}

fn parse_time(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M").unwrap_or_else(|_| NaiveTime::from_hms_opt(0, 0, 0).unwrap())
}

/// Runs the full pre-order chain. On success returns the acquired buy-lock
/// holder token; the caller is responsible for releasing it once the order
/// either confirms or definitively fails.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    signal: &BuySignal,
    sector_group: &str,
    portfolio: &PortfolioState,
    regime: MarketRegime,
    daily_buy_count: u32,
    candidate_notional: f64,
    is_manual: bool,
    now: DateTime<Utc>,
    config: &Config,
    lock: &DistributedLock,
    holder: &str,
    cooldowns: &Cooldowns,
    trade_log: &TradeLog,
    correlation: &CorrelationCache,
    gateway: &GatewayClient,
) -> Result<(), RejectReason> {
    let code = signal.stock_code.as_str();

    // 1. Market session check (MANUAL bypasses).
    if !is_manual {
        let t = now.time();
        if t < parse_time(&config.session_open) || t > parse_time(&config.session_close) {
            return Err(RejectReason::OutsideSession);
        }
    }

    // 2. Emergency stop flag checked by the caller before this is invoked
    // (it needs the typed cache, not bundled here to avoid yet another
    // parameter on an already-long signature); see main.rs's call site.

    // 3. Distributed buy lock.
    let acquired = risk_fabric::locks::BUY_LOCK_TTL;
    let key = risk_fabric::cache::keys::buy_lock(code);
    if !lock.acquire(&key, holder, acquired).await.unwrap_or(false) {
        return Err(RejectReason::LockContention);
    }

    // 4. Already-held check.
    if portfolio.positions.iter().any(|p| p.stock_code.as_str() == code) {
        lock.release(&key, holder).await.ok();
        return Err(RejectReason::AlreadyHeld);
    }

    // 5. Duplicate-order window.
    match trade_log
        .has_entry_within(code, now, config.duplicate_order_window)
        .await
    {
        Ok(true) => {
            lock.release(&key, holder).await.ok();
            return Err(RejectReason::DuplicateOrderWindow);
        }
        Ok(false) => {}
        Err(_) => {}
    }

    // 6. Scout veto / hard floor.
    if signal.trade_tier == domain::watchlist::TradeTier::Blocked
        || signal.hybrid_score < config.scout_hybrid_floor
    {
        lock.release(&key, holder).await.ok();
        return Err(RejectReason::ScoutVeto {
            hybrid_score: signal.hybrid_score,
        });
    }

    // 7. Cooldown check.
    if cooldowns.is_stoploss_cooling_down(code).await.unwrap_or(false) {
        lock.release(&key, holder).await.ok();
        return Err(RejectReason::StopLossCooldown);
    }
    if cooldowns.is_sell_cooling_down(code).await.unwrap_or(false) {
        lock.release(&key, holder).await.ok();
        return Err(RejectReason::SellCooldown);
    }

    // 8. Correlation check against every currently held position.
    let source = GatewayCloseSource { gateway };
    for held in &portfolio.positions {
        let held_code = held.stock_code.as_str();
        let coefficient = correlation
            .get_or_fetch(code, held_code, &source)
            .await
            .unwrap_or(0.0);
        if coefficient.abs() >= config.correlation_threshold {
            lock.release(&key, holder).await.ok();
            return Err(RejectReason::Correlation {
                code: held_code.to_string(),
                coefficient,
            });
        }
    }

    // 9. Portfolio Guard.
    let outcome = risk_fabric::portfolio_guard::evaluate(
        signal,
        portfolio,
        regime,
        daily_buy_count,
        candidate_notional,
        sector_group,
        &config.guard,
    );
    if let GuardOutcome::Block(reason) = outcome {
        lock.release(&key, holder).await.ok();
        return Err(RejectReason::Guard(reason));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::stock_code::StockCode;

    #[test]
    fn reject_reason_display_matches_tag() {
        assert_eq!(RejectReason::OutsideSession.to_string(), "OUTSIDE_SESSION");
        assert_eq!(
            RejectReason::ScoutVeto { hybrid_score: 30.0 }.to_string(),
            "SCOUT_VETO hybrid=30.00"
        );
    }

    #[test]
    fn market_session_boundary_parses() {
        assert_eq!(parse_time("09:00"), NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(parse_time("15:30"), NaiveTime::from_hms_opt(15, 30, 0).unwrap());
    }

    #[test]
    fn code_extraction_uses_stock_code_as_str() {
        let code = StockCode::new("005930").unwrap();
        assert_eq!(code.as_str(), "005930");
    }
}
