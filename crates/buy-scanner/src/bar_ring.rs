// =============================================================================
// BarRing — per-stock_code ring buffer of the last 120 one-minute bars.
// Adapted from the Gateway's candle-buffer pattern: each incoming tick
// either extends the in-progress bar for the current minute or rolls it
// over, freezing the closed bar and evicting the oldest once the ring is
// full (spec §4.2).
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use domain::stock_code::StockCode;
use domain::tick::MinuteBar;

const MAX_BARS: usize = 120;

pub struct BarRing {
    bars: RwLock<HashMap<String, VecDeque<MinuteBar>>>,
    max_bars: usize,
}

impl BarRing {
    pub fn new() -> Self {
        Self::with_capacity(MAX_BARS)
    }

    pub fn with_capacity(max_bars: usize) -> Self {
        Self {
            bars: RwLock::new(HashMap::new()),
            max_bars,
        }
    }

    /// Folds one tick into the ring for `stock_code`, starting a new bar on
    /// minute rollover and trimming to `max_bars`.
    pub fn update(&self, stock_code: &StockCode, minute_ts: i64, price: f64, volume: u64) {
        let mut bars = self.bars.write().expect("bar ring lock poisoned");
        let entry = bars.entry(stock_code.to_string()).or_default();

        match entry.back_mut() {
            Some(last) if last.minute_ts == minute_ts => {
                last.absorb(price, volume);
            }
            _ => {
                entry.push_back(MinuteBar::start(stock_code.clone(), minute_ts, price, volume));
                while entry.len() > self.max_bars {
                    entry.pop_front();
                }
            }
        }
    }

    /// All bars currently held for `stock_code`, oldest first. The last
    /// entry may still be in-progress (the current minute).
    pub fn bars(&self, stock_code: &StockCode) -> Vec<MinuteBar> {
        let bars = self.bars.read().expect("bar ring lock poisoned");
        bars.get(stock_code.as_str())
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Closed bars only (everything except the last, possibly in-progress,
    /// entry).
    pub fn closed_bars(&self, stock_code: &StockCode) -> Vec<MinuteBar> {
        let mut bars = self.bars(stock_code);
        bars.pop();
        bars
    }

    pub fn closes(&self, stock_code: &StockCode) -> Vec<f64> {
        self.bars(stock_code).iter().map(|b| b.close).collect()
    }
}

impl Default for BarRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> StockCode {
        StockCode::new("005930").unwrap()
    }

    #[test]
    fn same_minute_ticks_absorb_into_one_bar() {
        let ring = BarRing::new();
        ring.update(&code(), 100, 10_000.0, 5);
        ring.update(&code(), 100, 10_050.0, 3);
        assert_eq!(ring.bars(&code()).len(), 1);
        let bar = &ring.bars(&code())[0];
        assert_eq!(bar.volume, 8);
        assert_eq!(bar.close, 10_050.0);
    }

    #[test]
    fn minute_rollover_starts_new_bar() {
        let ring = BarRing::new();
        ring.update(&code(), 100, 10_000.0, 5);
        ring.update(&code(), 101, 10_100.0, 2);
        assert_eq!(ring.bars(&code()).len(), 2);
    }

    #[test]
    fn ring_trims_to_capacity() {
        let ring = BarRing::with_capacity(3);
        for i in 0..10 {
            ring.update(&code(), i, 10_000.0 + i as f64, 1);
        }
        assert_eq!(ring.bars(&code()).len(), 3);
    }

    #[test]
    fn closed_bars_excludes_last_in_progress_entry() {
        let ring = BarRing::new();
        ring.update(&code(), 100, 10_000.0, 1);
        ring.update(&code(), 101, 10_100.0, 1);
        assert_eq!(ring.closed_bars(&code()).len(), 1);
    }
}
