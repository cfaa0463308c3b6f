// =============================================================================
// SellOrder — published to `stream:sell-orders` by the Price Monitor (or, as
// the only other source, a MANUAL sell from the operator Telegram bot,
// bypassing the monitor's exit chain entirely).
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stock_code::StockCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SellReason {
    #[serde(rename = "PROFIT_TARGET")]
    ProfitTarget,
    #[serde(rename = "PROFIT_FLOOR")]
    ProfitFloor,
    #[serde(rename = "PROFIT_LOCK")]
    ProfitLock,
    #[serde(rename = "BREAKEVEN_STOP")]
    BreakevenStop,
    #[serde(rename = "STOP_LOSS")]
    StopLoss,
    #[serde(rename = "ATR_STOP")]
    AtrStop,
    #[serde(rename = "TRAILING_STOP")]
    TrailingStop,
    #[serde(rename = "SCALE_OUT")]
    ScaleOut,
    #[serde(rename = "RSI_OVERBOUGHT")]
    RsiOverbought,
    #[serde(rename = "DEATH_CROSS")]
    DeathCross,
    #[serde(rename = "TIME_EXIT")]
    TimeExit,
    #[serde(rename = "MANUAL")]
    Manual,
}

impl SellReason {
    /// Reasons that additionally require the 3-day stop-loss cooldown on
    /// top of the universal 24 h sell cooldown (spec §4.5).
    pub fn triggers_stoploss_cooldown(self) -> bool {
        matches!(
            self,
            Self::StopLoss | Self::AtrStop | Self::DeathCross | Self::BreakevenStop
        )
    }

    /// Hard Stop and Fixed Stop bypass the executor's signal-cooldown check
    /// but still respect the per-code sell lock (spec §4.3 "Publish").
    pub fn bypasses_signal_cooldown(self) -> bool {
        matches!(self, Self::StopLoss)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellOrder {
    pub stock_code: StockCode,
    pub stock_name: String,
    pub sell_reason: SellReason,
    pub current_price: f64,
    pub quantity: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub buy_price: Option<f64>,
    #[serde(default)]
    pub profit_pct: Option<f64>,
    #[serde(default)]
    pub holding_days: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SellOrderError {
    #[error("quantity must be > 0, got {0}")]
    NonPositiveQuantity(u64),
}

impl SellOrder {
    pub fn new(
        stock_code: StockCode,
        stock_name: impl Into<String>,
        sell_reason: SellReason,
        current_price: f64,
        quantity: u64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, SellOrderError> {
        if quantity == 0 {
            return Err(SellOrderError::NonPositiveQuantity(quantity));
        }
        Ok(Self {
            stock_code,
            stock_name: stock_name.into(),
            sell_reason,
            current_price,
            quantity,
            timestamp,
            buy_price: None,
            profit_pct: None,
            holding_days: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stoploss_cooldown_reasons_match_spec() {
        assert!(SellReason::StopLoss.triggers_stoploss_cooldown());
        assert!(SellReason::AtrStop.triggers_stoploss_cooldown());
        assert!(SellReason::DeathCross.triggers_stoploss_cooldown());
        assert!(SellReason::BreakevenStop.triggers_stoploss_cooldown());
        assert!(!SellReason::TrailingStop.triggers_stoploss_cooldown());
        assert!(!SellReason::ScaleOut.triggers_stoploss_cooldown());
    }

    #[test]
    fn rejects_zero_quantity() {
        let err = SellOrder::new(
            StockCode::new("005930").unwrap(),
            "Samsung",
            SellReason::TrailingStop,
            75_100.0,
            0,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, SellOrderError::NonPositiveQuantity(0));
    }
}
