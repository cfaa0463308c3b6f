// =============================================================================
// Position — an open holding with local metadata. Exclusively owned by the
// executor that last mutated it; concurrent readers see point-in-time
// snapshots. Created on confirmed buy fill; mutated only by the sell
// executor (on exit) and the monitor (high_watermark, stop_loss_price).
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stock_code::StockCode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub stock_code: StockCode,
    pub stock_name: String,
    pub quantity: u64,
    pub average_buy_price: f64,
    pub total_buy_amount: f64,
    pub sector_group: String,
    pub high_watermark: f64,
    pub stop_loss_price: f64,
    pub bought_at: DateTime<Utc>,
    /// Cursor into the regime-specific scale-out ladder (§4.3 rule 6).
    /// Advances by exactly one level per firing; persisted before the
    /// corresponding SellOrder is published so a crash cannot re-fire a
    /// level that already executed.
    #[serde(default)]
    pub scale_out_level: usize,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PositionError {
    #[error("quantity must be > 0, got {0}")]
    NonPositiveQuantity(u64),
    #[error("total_buy_amount {total} does not equal quantity * average_buy_price {expected}")]
    InconsistentBuyAmount { total: f64, expected: f64 },
    #[error("high_watermark {hwm} is below average_buy_price {avg} at creation")]
    HighWatermarkBelowAverage { hwm: f64, avg: f64 },
}

impl Position {
    /// Build a freshly-opened position, checking the three invariants the
    /// spec's testable properties bind at creation time.
    pub fn open(
        stock_code: StockCode,
        stock_name: impl Into<String>,
        quantity: u64,
        average_buy_price: f64,
        sector_group: impl Into<String>,
        stop_loss_price: f64,
        bought_at: DateTime<Utc>,
    ) -> Result<Self, PositionError> {
        if quantity == 0 {
            return Err(PositionError::NonPositiveQuantity(quantity));
        }
        let total_buy_amount = quantity as f64 * average_buy_price;
        let high_watermark = average_buy_price;
        if high_watermark < average_buy_price {
            return Err(PositionError::HighWatermarkBelowAverage {
                hwm: high_watermark,
                avg: average_buy_price,
            });
        }

        Ok(Self {
            stock_code,
            stock_name: stock_name.into(),
            quantity,
            average_buy_price,
            total_buy_amount,
            sector_group: sector_group.into(),
            high_watermark,
            stop_loss_price,
            bought_at,
            scale_out_level: 0,
        })
    }

    /// Validate that the persisted invariant `total_buy_amount == quantity *
    /// average_buy_price` still holds (used by the persist step and tests;
    /// not called on every read since floating-point round-trips through a
    /// partial close legitimately recompute rather than re-verify).
    pub fn check_buy_amount_consistent(&self) -> Result<(), PositionError> {
        let expected = self.quantity as f64 * self.average_buy_price;
        if (self.total_buy_amount - expected).abs() > 1e-6 {
            return Err(PositionError::InconsistentBuyAmount {
                total: self.total_buy_amount,
                expected,
            });
        }
        Ok(())
    }

    /// Update the high-water-mark in place: `max(high_watermark, price)`.
    /// Called by the Price Monitor on every tick for a held code.
    pub fn bump_high_watermark(&mut self, current_price: f64) {
        if current_price > self.high_watermark {
            self.high_watermark = current_price;
        }
    }

    /// Current unrealized profit percentage relative to the average buy
    /// price.
    pub fn profit_pct(&self, current_price: f64) -> f64 {
        if self.average_buy_price <= 0.0 {
            return 0.0;
        }
        (current_price - self.average_buy_price) / self.average_buy_price * 100.0
    }

    /// Profit percentage at the high-water-mark, used by several exit rules
    /// (Profit Floor, Breakeven Stop, Trailing TP).
    pub fn high_profit_pct(&self) -> f64 {
        if self.average_buy_price <= 0.0 {
            return 0.0;
        }
        (self.high_watermark - self.average_buy_price) / self.average_buy_price * 100.0
    }

    pub fn holding_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.bought_at).num_days()
    }

    /// Apply a partial scale-out: reduce quantity, recompute
    /// `total_buy_amount`, advance the cursor. `high_watermark` and
    /// `stop_loss_price` are left untouched per spec §4.5.
    pub fn apply_scale_out(&mut self, sold_quantity: u64) {
        self.quantity = self.quantity.saturating_sub(sold_quantity);
        self.total_buy_amount = self.quantity as f64 * self.average_buy_price;
        self.scale_out_level += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> StockCode {
        StockCode::new("005930").unwrap()
    }

    #[test]
    fn open_rejects_zero_quantity() {
        let err = Position::open(code(), "Samsung", 0, 72_120.0, "semis", 67_793.0, Utc::now())
            .unwrap_err();
        assert_eq!(err, PositionError::NonPositiveQuantity(0));
    }

    #[test]
    fn open_computes_consistent_total() {
        let pos = Position::open(code(), "Samsung", 12, 72_120.0, "semis", 67_793.0, Utc::now())
            .unwrap();
        assert!((pos.total_buy_amount - 12.0 * 72_120.0).abs() < f64::EPSILON);
        assert!(pos.check_buy_amount_consistent().is_ok());
        assert!(pos.high_watermark >= pos.average_buy_price);
    }

    #[test]
    fn bump_high_watermark_only_increases() {
        let mut pos =
            Position::open(code(), "Samsung", 12, 72_120.0, "semis", 67_793.0, Utc::now())
                .unwrap();
        pos.bump_high_watermark(75_000.0);
        assert_eq!(pos.high_watermark, 75_000.0);
        pos.bump_high_watermark(70_000.0);
        assert_eq!(pos.high_watermark, 75_000.0);
    }

    #[test]
    fn profit_pct_and_high_profit_pct() {
        let mut pos =
            Position::open(code(), "Samsung", 100, 10_000.0, "semis", 9_400.0, Utc::now())
                .unwrap();
        pos.bump_high_watermark(10_400.0);
        assert!((pos.high_profit_pct() - 4.0).abs() < 1e-9);
        assert!((pos.profit_pct(10_020.0) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn scale_out_recomputes_total_and_advances_cursor() {
        let mut pos =
            Position::open(code(), "Samsung", 100, 10_000.0, "semis", 9_400.0, Utc::now())
                .unwrap();
        let hwm_before = pos.high_watermark;
        let sl_before = pos.stop_loss_price;
        pos.apply_scale_out(25);
        assert_eq!(pos.quantity, 75);
        assert!((pos.total_buy_amount - 75.0 * 10_000.0).abs() < f64::EPSILON);
        assert_eq!(pos.scale_out_level, 1);
        assert_eq!(pos.high_watermark, hwm_before);
        assert_eq!(pos.stop_loss_price, sl_before);
    }
}
