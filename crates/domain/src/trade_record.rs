// =============================================================================
// TradeRecord — append-only execution log. Used by cooldown reconstruction
// after restart (the sell executor's in-memory "sold within 24 h" set can be
// rebuilt from this log rather than only from the cache's TTL keys).
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sell_order::SellReason;
use crate::stock_code::StockCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub stock_code: StockCode,
    pub side: TradeSide,
    pub quantity: u64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub sell_reason: Option<SellReason>,
    #[serde(default)]
    pub profit_pct: Option<f64>,
    #[serde(default)]
    pub holding_days: Option<i64>,
}

impl TradeRecord {
    pub fn buy(stock_code: StockCode, quantity: u64, price: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            stock_code,
            side: TradeSide::Buy,
            quantity,
            price,
            timestamp,
            sell_reason: None,
            profit_pct: None,
            holding_days: None,
        }
    }

    pub fn sell(
        stock_code: StockCode,
        quantity: u64,
        price: f64,
        timestamp: DateTime<Utc>,
        sell_reason: SellReason,
        profit_pct: f64,
        holding_days: i64,
    ) -> Self {
        Self {
            stock_code,
            side: TradeSide::Sell,
            quantity,
            price,
            timestamp,
            sell_reason: Some(sell_reason),
            profit_pct: Some(profit_pct),
            holding_days: Some(holding_days),
        }
    }

    /// Whether this record is a sell that should have left a stop-loss
    /// cooldown marker (spec §8 quantified invariant: a losing sell with a
    /// stop-loss-family reason must have `cooldown:stoploss:{code}` set).
    pub fn requires_stoploss_cooldown(&self) -> bool {
        self.side == TradeSide::Sell
            && self.profit_pct.is_some_and(|p| p <= 0.0)
            && self
                .sell_reason
                .is_some_and(|r| r.triggers_stoploss_cooldown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn losing_stoploss_sell_requires_cooldown() {
        let record = TradeRecord::sell(
            StockCode::new("005930").unwrap(),
            100,
            9_400.0,
            Utc::now(),
            SellReason::StopLoss,
            -6.0,
            3,
        );
        assert!(record.requires_stoploss_cooldown());
    }

    #[test]
    fn winning_sell_does_not_require_cooldown() {
        let record = TradeRecord::sell(
            StockCode::new("005930").unwrap(),
            100,
            11_000.0,
            Utc::now(),
            SellReason::TrailingStop,
            10.0,
            5,
        );
        assert!(!record.requires_stoploss_cooldown());
    }

    #[test]
    fn buy_record_never_requires_cooldown() {
        let record = TradeRecord::buy(StockCode::new("005930").unwrap(), 100, 10_000.0, Utc::now());
        assert!(!record.requires_stoploss_cooldown());
    }
}
