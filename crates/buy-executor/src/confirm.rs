// =============================================================================
// Order placement + confirmation protocol (spec §4.4 "Order type selection",
// "Confirmation protocol"). Shared shape with the Sell Executor's own
// confirm loop: place, poll order_status up to N times at a fixed interval,
// cancel-and-recheck on the final timeout, DRYRUN sentinel short-circuits
// polling entirely.
// =============================================================================

use chrono::Utc;
use domain::order::{OrderRequest, OrderResult, OrderType};
use domain::signal::SignalType;
use domain::stock_code::StockCode;
use gateway_client::{GatewayClient, GatewayError};

use crate::config::Config;
use crate::tick_align::align_to_tick;

/// DRYRUN mode never produces a real order number; the Gateway returns this
/// literal sentinel instead, and every polling step is skipped for it.
pub const DRYRUN_SENTINEL: &str = "DRYRUN";

#[derive(Debug, Clone, PartialEq)]
pub enum FillOutcome {
    Filled { quantity: u64, avg_price: f64 },
    NoFill,
    Uncertain,
}

fn order_type_for(signal_type: SignalType) -> bool {
    matches!(
        signal_type,
        SignalType::Momentum | SignalType::MomentumContinuation
    )
}

/// Builds the buy `OrderRequest` for a signal: MOMENTUM family gets a limit
/// order at `signal_price * (1 + momentum_limit_premium)`, tick-aligned;
/// everything else is a market order.
pub fn build_order(
    stock_code: StockCode,
    quantity: u64,
    signal_type: SignalType,
    signal_price: f64,
    config: &Config,
) -> Result<OrderRequest, domain::order::OrderRequestError> {
    if order_type_for(signal_type) {
        let raw_price = signal_price * (1.0 + config.momentum_limit_premium);
        let price = align_to_tick(raw_price);
        OrderRequest::new(stock_code, quantity, OrderType::Limit, Some(price))
    } else {
        OrderRequest::new(stock_code, quantity, OrderType::Market, None)
    }
}

/// Places `order` and confirms the fill, polling up to `config.confirm_poll_attempts`
/// times at `config.confirm_poll_interval`. Cancels on final no-fill and
/// re-checks once in case the cancel lost a race with a just-completed fill.
pub async fn place_and_confirm(
    gateway: &GatewayClient,
    order: &OrderRequest,
    config: &Config,
) -> Result<FillOutcome, GatewayError> {
    let result: OrderResult = gateway.place_buy(order).await?;
    if !result.success {
        return Ok(FillOutcome::NoFill);
    }
    let Some(order_no) = result.order_no.clone() else {
        return Ok(FillOutcome::NoFill);
    };
    if order_no == DRYRUN_SENTINEL {
        return Ok(FillOutcome::Filled {
            quantity: result.filled_quantity,
            avg_price: result.avg_fill_price,
        });
    }

    for _ in 0..config.confirm_poll_attempts {
        tokio::time::sleep(config.confirm_poll_interval).await;
        let status = gateway.order_status(&order_no).await?;
        if status.filled {
            return Ok(FillOutcome::Filled {
                quantity: status.filled_qty,
                avg_price: status.avg_price,
            });
        }
    }

    match gateway.cancel(&order_no).await {
        Ok(true) => Ok(FillOutcome::NoFill),
        Ok(false) | Err(_) => match gateway.order_status(&order_no).await {
            Ok(status) if status.filled => Ok(FillOutcome::Filled {
                quantity: status.filled_qty,
                avg_price: status.avg_price,
            }),
            Ok(_) => Ok(FillOutcome::Uncertain),
            Err(_) => Ok(FillOutcome::Uncertain),
        },
    }
}

/// Spec §4.4's worked example (72,120 at 6% stop, multiplier 1.0 → 67,793)
/// only reproduces under ordinary won rounding, not tick-floor truncation —
/// KRW has no subunit, so the "round_down" in the prose means "round to
/// the nearest whole won," not "floor to the venue's tick ladder."
pub fn round_down_stop_loss(avg_fill_price: f64, stop_loss_pct: f64, macro_stop_mult: f64) -> f64 {
    let raw = avg_fill_price * (1.0 - (stop_loss_pct / 100.0) * macro_stop_mult);
    raw.round()
}

pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn momentum_family_uses_limit_order() {
        let order = build_order(
            StockCode::new("005930").unwrap(),
            10,
            SignalType::Momentum,
            72_100.0,
            &Config::from_env(),
        )
        .unwrap();
        assert_eq!(order.order_type, OrderType::Limit);
        assert!(order.price.is_some());
    }

    #[test]
    fn golden_cross_uses_market_order() {
        let order = build_order(
            StockCode::new("005930").unwrap(),
            10,
            SignalType::GoldenCross,
            72_100.0,
            &Config::from_env(),
        )
        .unwrap();
        assert_eq!(order.order_type, OrderType::Market);
        assert!(order.price.is_none());
    }

    #[test]
    fn stop_loss_matches_spec_example() {
        let stop = round_down_stop_loss(72_120.0, 6.0, 1.0);
        assert_eq!(stop, 67_793.0);
    }
}
