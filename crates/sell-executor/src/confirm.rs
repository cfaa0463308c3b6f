// =============================================================================
// Order placement + confirmation protocol for sells (spec §4.5). Same
// place-then-poll shape as the buy executor's confirm loop, always a market
// order since an exit must not wait on a limit fill.
// =============================================================================

use domain::order::{OrderRequest, OrderResult, OrderType};
use domain::stock_code::StockCode;
use gateway_client::{GatewayClient, GatewayError};

use crate::config::Config;

pub const DRYRUN_SENTINEL: &str = "DRYRUN";

#[derive(Debug, Clone, PartialEq)]
pub enum FillOutcome {
    Filled { quantity: u64, avg_price: f64 },
    NoFill,
    Uncertain,
}

pub fn build_order(
    stock_code: StockCode,
    quantity: u64,
) -> Result<OrderRequest, domain::order::OrderRequestError> {
    OrderRequest::new(stock_code, quantity, OrderType::Market, None)
}

/// Places `order` and confirms the fill, polling up to `config.confirm_poll_attempts`
/// times at `config.confirm_poll_interval`. Cancels on final no-fill and
/// re-checks once, since an unconfirmable-and-uncancellable sell leaves the
/// position `uncertain` for the monitor's reconciliation to resolve.
pub async fn place_and_confirm(
    gateway: &GatewayClient,
    order: &OrderRequest,
    config: &Config,
) -> Result<FillOutcome, GatewayError> {
    let result: OrderResult = gateway.place_sell(order).await?;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sell_order_is_always_market() {
        let order = build_order(StockCode::new("005930").unwrap(), 10).unwrap();
        assert_eq!(order.order_type, OrderType::Market);
        assert!(order.price.is_none());
    }

    #[test]
    fn rejects_zero_quantity() {
        let err = build_order(StockCode::new("005930").unwrap(), 0).unwrap_err();
        assert_eq!(err, domain::order::OrderRequestError::NonPositiveQuantity(0));
    }
}
