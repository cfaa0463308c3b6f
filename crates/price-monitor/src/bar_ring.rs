// =============================================================================
// BarRing — per-stock_code ring buffer of the last 120 one-minute bars.
// Identical shape to the Buy Scanner's ring (spec §4.2); the Monitor keeps
// its own copy rather than sharing one, since the two processes never share
// memory (spec §5).
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

    pub fn bars(&self, stock_code: &StockCode) -> Vec<MinuteBar> {
        let bars = self.bars.read().expect("bar ring lock poisoned");
        bars.get(stock_code.as_str())
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn closes(&self, stock_code: &StockCode) -> Vec<f64> {
        self.bars(stock_code).iter().map(|b| b.close).collect()
    }

    pub fn remove(&self, stock_code: &StockCode) {
        let mut bars = self.bars.write().expect("bar ring lock poisoned");
        bars.remove(stock_code.as_str());
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
    }

    #[test]
    fn remove_drops_a_codes_history() {
        let ring = BarRing::new();
        ring.update(&code(), 100, 10_000.0, 5);
        ring.remove(&code());
        assert!(ring.bars(&code()).is_empty());
    }
}
