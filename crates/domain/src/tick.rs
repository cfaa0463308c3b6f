// =============================================================================
// PriceTick / MinuteBar — the raw market-data feed and its per-minute
// aggregate derived by the Buy Scanner.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stock_code::StockCode;

/// One inbound quote/execution event, decoded by the Gateway's WebSocket
/// reader and published to `stream:ticks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTick {
    pub stock_code: StockCode,
    pub price: f64,
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PriceTickError {
    #[error("price must be > 0, got {0}")]
    NonPositivePrice(f64),
}

impl PriceTick {
    pub fn new(
        stock_code: StockCode,
        price: f64,
        volume: u64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, PriceTickError> {
        if price <= 0.0 {
            return Err(PriceTickError::NonPositivePrice(price));
        }
        Ok(Self {
            stock_code,
            price,
            volume,
            timestamp,
        })
    }
}

/// A closed or in-progress one-minute OHLCV aggregate. The Buy Scanner keeps
/// a ring of the last 120 of these per stock_code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinuteBar {
    pub stock_code: StockCode,
    pub minute_ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl MinuteBar {
    /// Start a new bar from the first tick in a minute.
    pub fn start(stock_code: StockCode, minute_ts: i64, price: f64, volume: u64) -> Self {
        Self {
            stock_code,
            minute_ts,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    /// Fold another tick from the same minute into this bar.
    pub fn absorb(&mut self, price: f64, volume: u64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_price() {
        let err = PriceTick::new(
            StockCode::new("005930").unwrap(),
            0.0,
            10,
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, PriceTickError::NonPositivePrice(0.0));
    }

    #[test]
    fn bar_absorbs_updates_high_low_close_volume() {
        let mut bar = MinuteBar::start(StockCode::new("005930").unwrap(), 0, 100.0, 10);
        bar.absorb(105.0, 5);
        bar.absorb(98.0, 3);
        bar.absorb(101.0, 2);
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.high, 105.0);
        assert_eq!(bar.low, 98.0);
        assert_eq!(bar.close, 101.0);
        assert_eq!(bar.volume, 20);
    }
}
